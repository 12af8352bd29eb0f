//! JSON_AGGREGATE: collects named sections from several prior tasks into
//! one JSON document.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::model::task::AggregateSection;

use super::ProcessorError;

pub struct JsonAggregateResult {
    pub output_file: String,
    pub sections_written: usize,
}

pub fn run(
    results: &HashMap<String, HashMap<String, Value>>,
    workflow_id: &str,
    output_file: &str,
    sections: &[AggregateSection],
    include_metadata: bool,
) -> Result<JsonAggregateResult, ProcessorError> {
    let mut aggregated = Map::new();
    let mut sections_written = 0usize;

    for section in sections {
        let source = results.get(&section.source_task);
        let field = source.and_then(|output| output.get(&section.source_field));

        match field {
            Some(value) => {
                aggregated.insert(section.name.clone(), value.clone());
                sections_written += 1;
            }
            None if section.optional => continue,
            None if source.is_none() => {
                return Err(ProcessorError::SourceNotFound(section.source_task.clone()));
            }
            None => {
                return Err(ProcessorError::FieldNotFound {
                    task: section.source_task.clone(),
                    field: section.source_field.clone(),
                });
            }
        }
    }

    if include_metadata {
        aggregated.insert(
            "metadata".to_string(),
            json!({
                "generated_at": Utc::now().to_rfc3339(),
                "workflow_id": workflow_id,
                "total_sections": sections_written,
            }),
        );
    }

    if let Some(parent) = std::path::Path::new(output_file).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProcessorError::WriteFailed(output_file.to_string(), e.to_string()))?;
        }
    }

    let text = serde_json::to_string_pretty(&Value::Object(aggregated)).unwrap_or_default();
    std::fs::write(output_file, text)
        .map_err(|e| ProcessorError::WriteFailed(output_file.to_string(), e.to_string()))?;

    Ok(JsonAggregateResult {
        output_file: output_file.to_string(),
        sections_written,
    })
}
