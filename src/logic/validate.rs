use serde_json::{Map, Value};

use crate::error::{ApiError, FieldErrors};
use crate::model::{FormDefinition, FormField, SampleFormNames, SampleValidationFlags};

/// Sample field holding the individual a sample was taken from
pub const INDIVIDUAL_FIELD: &str = "individual";
/// Field holding treatments, on samples and on individuals
pub const TREATMENTS_FIELD: &str = "treatments";

/// Form validation seam: field order plus a validate call over form-format data.
pub trait FormSchema: Send + Sync {
    fn form_name(&self) -> &str;
    /// Top-level field names in declaration order
    fn field_names(&self) -> Vec<&str>;
    fn validate(&self, data: &Map<String, Value>) -> Result<(), FieldErrors>;
}

impl FormSchema for FormDefinition {
    fn form_name(&self) -> &str {
        &self.name
    }

    fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn validate(&self, data: &Map<String, Value>) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        validate_fields(&self.fields, data, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => fields.is_empty(),
        Some(_) => false,
    }
}

fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn push_error(errors: &mut FieldErrors, path: String, message: &str) {
    errors.entry(path).or_default().push(message.to_string());
}

// Fields not declared by the form are ignored.
fn validate_fields(fields: &[FormField], data: &Map<String, Value>, prefix: &str, errors: &mut FieldErrors) {
    for field in fields {
        let path = field_path(prefix, &field.name);
        let value = data.get(&field.name);

        let Some(value) = value.filter(|_| !is_blank(value)) else {
            if field.required {
                push_error(errors, path, "This field is required.");
            }
            continue;
        };

        match (field.fields.is_empty(), field.multiple, value) {
            (false, false, Value::Object(nested)) => {
                validate_fields(&field.fields, nested, &path, errors);
            }
            (false, false, _) => push_error(errors, path, "Expected an object."),
            (false, true, Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, index);
                    match item {
                        Value::Object(nested) => validate_fields(&field.fields, nested, &item_path, errors),
                        _ => push_error(errors, item_path, "Expected an object."),
                    }
                }
            }
            (false, true, _) => push_error(errors, path, "Expected a list of objects."),
            (true, true, Value::Array(_)) => {}
            (true, true, _) => push_error(errors, path, "Expected a list."),
            (true, false, Value::Object(_)) => push_error(errors, path, "Expected a single value."),
            (true, false, _) => {}
        }
    }
}

pub fn validate_form_format_against_form(
    form: &dyn FormSchema,
    data: &Map<String, Value>,
) -> Result<(), ApiError> {
    form.validate(data).map_err(|errors| ApiError::Validation {
        form_name: form.form_name().to_string(),
        errors,
    })
}

/// How a nested entity is validated before it is written back.
pub trait EntityValidator: Send + Sync {
    /// Form whose field order the stored entity follows, if any
    fn ordering_form(&self) -> Option<&dyn FormSchema>;
    fn validate(&self, data: &Map<String, Value>) -> Result<(), ApiError>;
}

/// Datasets and processing events: one form for the whole entity.
pub struct SingleFormValidator {
    form: FormDefinition,
}

impl SingleFormValidator {
    pub fn new(form: FormDefinition) -> Self {
        Self { form }
    }
}

impl EntityValidator for SingleFormValidator {
    fn ordering_form(&self) -> Option<&dyn FormSchema> {
        Some(&self.form)
    }

    fn validate(&self, data: &Map<String, Value>) -> Result<(), ApiError> {
        validate_form_format_against_form(&self.form, data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStep {
    TreatmentInd,
    Individual,
    TreatmentSam,
    Sample,
}

impl SampleStep {
    pub const ALL: [SampleStep; 4] = [
        SampleStep::TreatmentInd,
        SampleStep::Individual,
        SampleStep::TreatmentSam,
        SampleStep::Sample,
    ];

    pub fn is_enabled(self, flags: &SampleValidationFlags) -> bool {
        match self {
            Self::TreatmentInd => flags.treatment_ind,
            Self::Individual => flags.individual,
            Self::TreatmentSam => flags.treatment_sam,
            Self::Sample => flags.sample,
        }
    }

    pub fn form_name(self, names: &SampleFormNames) -> &str {
        match self {
            Self::TreatmentInd => &names.treatment_ind,
            Self::Individual => &names.individual,
            Self::TreatmentSam => &names.treatment_sam,
            Self::Sample => &names.sample,
        }
    }

    /// The objects of a sample this step validates.
    fn targets(self, sample: &Map<String, Value>) -> Vec<&Map<String, Value>> {
        let individual = sample.get(INDIVIDUAL_FIELD).and_then(Value::as_object);
        match self {
            Self::Sample => vec![sample],
            Self::Individual => individual.into_iter().collect(),
            Self::TreatmentInd => individual.map(treatments).unwrap_or_default(),
            Self::TreatmentSam => treatments(sample),
        }
    }
}

fn treatments(object: &Map<String, Value>) -> Vec<&Map<String, Value>> {
    object
        .get(TREATMENTS_FIELD)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

/// Samples: the sample, its individual and both kinds of treatments can each
/// be validated against their own form.
pub struct SampleValidator {
    steps: Vec<(SampleStep, FormDefinition)>,
}

impl SampleValidator {
    pub fn new(steps: Vec<(SampleStep, FormDefinition)>) -> Self {
        Self { steps }
    }
}

impl EntityValidator for SampleValidator {
    fn ordering_form(&self) -> Option<&dyn FormSchema> {
        None
    }

    fn validate(&self, data: &Map<String, Value>) -> Result<(), ApiError> {
        for (step, form) in &self.steps {
            for target in step.targets(data) {
                validate_form_format_against_form(form, target)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn dataset_form() -> FormDefinition {
        FormDefinition::new(
            "dataset",
            vec![
                FormField::required("dataset_name"),
                FormField::optional("tags").list(),
                FormField::optional("process_events")
                    .list()
                    .with_fields(vec![FormField::required("process_event_type")]),
            ],
        )
    }

    #[test]
    fn test_valid_data_passes() {
        let data = as_map(json!({
            "uuid": "u-1",
            "dataset_name": "RNA",
            "tags": ["a"],
            "process_events": [{"process_event_type": "sequencing"}]
        }));

        assert!(dataset_form().validate(&data).is_ok());
    }

    #[test]
    fn test_missing_required_field_is_reported() {
        let data = as_map(json!({"dataset_name": "  "}));
        let errors = dataset_form().validate(&data).unwrap_err();

        assert_eq!(errors["dataset_name"], vec!["This field is required.".to_string()]);
    }

    #[test]
    fn test_nested_errors_carry_item_paths() {
        let data = as_map(json!({
            "dataset_name": "RNA",
            "tags": "not-a-list",
            "process_events": [{"process_event_type": "x"}, {}]
        }));
        let errors = dataset_form().validate(&data).unwrap_err();

        assert!(errors.contains_key("tags"));
        assert!(errors.contains_key("process_events[1].process_event_type"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validation_error_names_the_form() {
        let err = validate_form_format_against_form(&dataset_form(), &Map::new()).unwrap_err();

        match err {
            ApiError::Validation { form_name, errors } => {
                assert_eq!(form_name, "dataset");
                assert!(errors.contains_key("dataset_name"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_steps_validate_nested_objects() {
        let treatment = FormDefinition::new("treatment", vec![FormField::required("treatment_name")]);
        let validator = SampleValidator::new(vec![(SampleStep::TreatmentInd, treatment)]);

        let valid = as_map(json!({
            "sample_name": "S1",
            "individual": {"individual_name": "I1", "treatments": [{"treatment_name": "T1"}]}
        }));
        let invalid = as_map(json!({
            "sample_name": "S1",
            "individual": {"individual_name": "I1", "treatments": [{"dose": 3}]}
        }));

        assert!(validator.validate(&valid).is_ok());
        assert!(matches!(validator.validate(&invalid), Err(ApiError::Validation { .. })));
    }

    #[test]
    fn test_sample_step_flags_and_names() {
        let flags = SampleValidationFlags {
            sample: true,
            ..Default::default()
        };
        let names = SampleFormNames::default();

        let enabled: Vec<_> = SampleStep::ALL.into_iter().filter(|s| s.is_enabled(&flags)).collect();
        assert_eq!(enabled, vec![SampleStep::Sample]);
        assert_eq!(SampleStep::TreatmentSam.form_name(&names), "treatment");
    }
}
