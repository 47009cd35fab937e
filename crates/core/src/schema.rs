//! JSON schemas for record bodies.
//!
//! Records are validated as JSON before they are deserialized into their
//! typed form, so a payload granule missing `granuleId` surfaces as a
//! `Validation` error naming the field rather than a serde error.

use cirrus_storage::RecordType;
use serde_json::Value;

use crate::error::PipelineError;

static EXECUTION_SCHEMA_STR: &str = include_str!("../schemas/execution.json");
static GRANULE_SCHEMA_STR: &str = include_str!("../schemas/granule.json");
static PDR_SCHEMA_STR: &str = include_str!("../schemas/pdr.json");

/// Compiled validators for every record type.
pub struct RecordSchemas {
    execution: jsonschema::Validator,
    granule: jsonschema::Validator,
    pdr: jsonschema::Validator,
}

impl RecordSchemas {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(RecordSchemas {
            execution: compile(RecordType::Execution, EXECUTION_SCHEMA_STR)?,
            granule: compile(RecordType::Granule, GRANULE_SCHEMA_STR)?,
            pdr: compile(RecordType::Pdr, PDR_SCHEMA_STR)?,
        })
    }

    fn validator(&self, record_type: RecordType) -> &jsonschema::Validator {
        match record_type {
            RecordType::Execution => &self.execution,
            RecordType::Granule => &self.granule,
            RecordType::Pdr => &self.pdr,
        }
    }

    /// Check `body` against the schema of `record_type`, reporting every
    /// violation in one error.
    pub fn validate(&self, record_type: RecordType, body: &Value) -> Result<(), PipelineError> {
        let messages: Vec<String> = self
            .validator(record_type)
            .iter_errors(body)
            .map(|e| e.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::validation(record_type, messages.join("; ")))
        }
    }
}

fn compile(record_type: RecordType, source: &str) -> Result<jsonschema::Validator, PipelineError> {
    let schema: Value = serde_json::from_str(source).map_err(|e| {
        PipelineError::validation(
            record_type,
            format!("internal error: failed to parse embedded schema: {}", e),
        )
    })?;
    jsonschema::validator_for(&schema).map_err(|e| {
        PipelineError::validation(
            record_type,
            format!("internal error: failed to compile schema: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_schemas_compile() {
        RecordSchemas::new().unwrap();
    }

    #[test]
    fn granule_requires_id_and_known_status() {
        let schemas = RecordSchemas::new().unwrap();
        let ok = json!({
            "granuleId": "g-1",
            "collectionId": "C___1",
            "status": "completed",
            "createdAt": 1,
            "updatedAt": 2
        });
        schemas.validate(RecordType::Granule, &ok).unwrap();

        let missing_id = json!({
            "collectionId": "C___1",
            "status": "completed",
            "createdAt": 1,
            "updatedAt": 2
        });
        let err = schemas
            .validate(RecordType::Granule, &missing_id)
            .unwrap_err();
        assert!(err.to_string().contains("granuleId"), "{err}");

        let bad_status = json!({
            "granuleId": "g-1",
            "collectionId": "C___1",
            "status": "queued",
            "createdAt": 1,
            "updatedAt": 2
        });
        assert!(schemas.validate(RecordType::Granule, &bad_status).is_err());
    }

    #[test]
    fn pdr_stats_are_required() {
        let schemas = RecordSchemas::new().unwrap();
        let body = json!({
            "pdrName": "p.PDR",
            "collectionId": "C___1",
            "provider": "prov",
            "status": "running",
            "progress": 0,
            "createdAt": 1,
            "updatedAt": 1
        });
        assert!(schemas.validate(RecordType::Pdr, &body).is_err());
    }
}
