use crate::model::{FormDefinition, FormField, Property, ValueType};
use crate::store::traits::Store;
use anyhow::Result;

/// Identifier of a seeded property
pub fn seed_property_id(name: &str) -> String {
    format!("prop_{}", name)
}

/// Helper function to create a seeded Property
fn create_property(name: &str, label: &str, level: &str, data_type: &str, synonyms: &[&str]) -> Property {
    Property {
        id: seed_property_id(name),
        name: name.to_string(),
        label: label.to_string(),
        description: String::new(),
        level: level.to_string(),
        synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        value_type: Some(ValueType {
            data_type: data_type.to_string(),
            controlled_vocabulary: None,
        }),
        deprecated: false,
    }
}

pub fn seed_properties() -> Vec<Property> {
    vec![
        create_property("uuid", "UUID", "0", "text", &[]),
        create_property("study_id", "Study ID", "1", "text", &[]),
        create_property("study_title", "Study title", "1", "text", &["title"]),
        create_property("study_type", "Study type", "1", "text", &[]),
        create_property("description", "Description", "1", "text", &[]),
        create_property("datasets", "Datasets", "1", "nested", &[]),
        create_property("dataset_name", "Dataset name", "2", "text", &[]),
        create_property("data_type", "Data type", "2", "text", &[]),
        create_property("tags", "Tags", "2", "text", &[]),
        create_property("datafiles", "Data files", "2", "nested", &[]),
        create_property("filename", "File name", "3", "text", &[]),
        create_property("checksum", "Checksum", "3", "text", &[]),
        create_property("process_events", "Processing events", "2", "nested", &[]),
        create_property("process_event_type", "Processing event type", "3", "text", &[]),
        create_property("process_event_date", "Processing event date", "3", "date", &[]),
        create_property("samples", "Samples", "1", "nested", &[]),
        create_property("sample_name", "Sample name", "2", "text", &[]),
        create_property("individual", "Individual", "2", "nested", &[]),
        create_property("individual_name", "Individual name", "3", "text", &[]),
        create_property("species", "Species", "3", "text", &["organism"]),
        create_property("treatments", "Treatments", "3", "nested", &[]),
        create_property("treatment_name", "Treatment name", "4", "text", &[]),
        create_property("dose", "Dose", "4", "text", &[]),
    ]
}

fn treatment_fields() -> Vec<FormField> {
    vec![
        FormField::optional("uuid"),
        FormField::required("treatment_name"),
        FormField::optional("dose"),
    ]
}

fn individual_fields() -> Vec<FormField> {
    vec![
        FormField::optional("uuid"),
        FormField::required("individual_name"),
        FormField::optional("species"),
        FormField::optional("treatments").list().with_fields(treatment_fields()),
    ]
}

pub fn seed_forms() -> Vec<FormDefinition> {
    vec![
        FormDefinition::new(
            "study",
            vec![
                FormField::required("study_id"),
                FormField::required("study_title"),
                FormField::optional("study_type"),
                FormField::optional("description"),
            ],
        ),
        FormDefinition::new(
            "dataset",
            vec![
                FormField::required("dataset_name"),
                FormField::optional("data_type"),
                FormField::optional("tags").list(),
                FormField::optional("datafiles").list().with_fields(vec![
                    FormField::required("filename"),
                    FormField::optional("checksum"),
                ]),
            ],
        ),
        FormDefinition::new(
            "process_event",
            vec![
                FormField::required("process_event_type"),
                FormField::optional("process_event_date"),
            ],
        ),
        FormDefinition::new(
            "sample",
            vec![
                FormField::required("sample_name"),
                FormField::optional("individual").with_fields(individual_fields()),
                FormField::optional("treatments").list().with_fields(treatment_fields()),
            ],
        ),
        FormDefinition::new("individual", individual_fields()),
        FormDefinition::new("treatment", treatment_fields()),
    ]
}

pub async fn load_seed_data<S: Store + ?Sized>(store: &S) -> Result<()> {
    for property in seed_properties() {
        store.upsert_property(property).await?;
    }
    for form in seed_forms() {
        store.upsert_form(form).await?;
    }
    log::info!("Seeded core properties and forms");
    Ok(())
}
