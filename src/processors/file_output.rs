//! FILE_OUTPUT: projects a field of a prior task's output to a flat file.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde_json::Value;

use crate::model::task::FileOutputFormat;

use super::ProcessorError;

pub struct FileOutputResult {
    pub output_file: String,
    pub items_written: usize,
}

/// `results` maps task id to that task's `output` map.
pub fn run(
    results: &HashMap<String, HashMap<String, Value>>,
    source_task: &str,
    source_field: &str,
    output_file: &str,
    extract_field: Option<&str>,
    format: FileOutputFormat,
) -> Result<FileOutputResult, ProcessorError> {
    let source = results
        .get(source_task)
        .ok_or_else(|| ProcessorError::SourceNotFound(source_task.to_string()))?;

    let field_value = source
        .get(source_field)
        .ok_or_else(|| ProcessorError::FieldNotFound {
            task: source_task.to_string(),
            field: source_field.to_string(),
        })?;

    let items = normalize_to_list(field_value, extract_field);

    let path = Path::new(output_file);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProcessorError::WriteFailed(output_file.to_string(), e.to_string()))?;
        }
    }

    match format {
        FileOutputFormat::Txt => {
            let mut file = std::fs::File::create(path)
                .map_err(|e| ProcessorError::WriteFailed(output_file.to_string(), e.to_string()))?;
            for item in &items {
                let line = value_to_line(item);
                writeln!(file, "{line}")
                    .map_err(|e| ProcessorError::WriteFailed(output_file.to_string(), e.to_string()))?;
            }
        }
        FileOutputFormat::Json => {
            let json = serde_json::to_string_pretty(&items).unwrap_or_default();
            std::fs::write(path, json)
                .map_err(|e| ProcessorError::WriteFailed(output_file.to_string(), e.to_string()))?;
        }
    }

    Ok(FileOutputResult {
        output_file: output_file.to_string(),
        items_written: items.len(),
    })
}

fn value_to_line(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize_to_list(value: &Value, extract_field: Option<&str>) -> Vec<Value> {
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };

    match extract_field {
        Some(field) => items
            .into_iter()
            .filter_map(|item| item.get(field).cloned())
            .collect(),
        None => items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results_with(task: &str, field: &str, value: Value) -> HashMap<String, HashMap<String, Value>> {
        let mut inner = HashMap::new();
        inner.insert(field.to_string(), value);
        let mut outer = HashMap::new();
        outer.insert(task.to_string(), inner);
        outer
    }

    #[test]
    fn writes_txt_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let results = results_with(
            "recon",
            "unique_subdomains",
            json!(["a.example.com", "b.example.com"]),
        );
        let out = dir.path().join("subdomains.txt");
        let result = run(
            &results,
            "recon",
            "unique_subdomains",
            out.to_str().unwrap(),
            None,
            FileOutputFormat::Txt,
        )
        .unwrap();
        assert_eq!(result.items_written, 2);
        let content = std::fs::read_to_string(out).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn extract_field_drops_items_missing_it() {
        let dir = tempfile::tempdir().unwrap();
        let results = results_with(
            "recon",
            "subdomains",
            json!([{"name": "a.example.com"}, {"other": "b"}]),
        );
        let out = dir.path().join("names.txt");
        let result = run(
            &results,
            "recon",
            "subdomains",
            out.to_str().unwrap(),
            Some("name"),
            FileOutputFormat::Txt,
        )
        .unwrap();
        assert_eq!(result.items_written, 1);
    }

    #[test]
    fn scalar_is_normalized_to_single_item_list() {
        let dir = tempfile::tempdir().unwrap();
        let results = results_with("recon", "count", json!(3));
        let out = dir.path().join("count.txt");
        let result = run(
            &results,
            "recon",
            "count",
            out.to_str().unwrap(),
            None,
            FileOutputFormat::Txt,
        )
        .unwrap();
        assert_eq!(result.items_written, 1);
    }

    #[test]
    fn missing_source_task_is_an_error() {
        let results = HashMap::new();
        let err = run(&results, "ghost", "field", "out.txt", None, FileOutputFormat::Txt)
            .unwrap_err();
        assert!(matches!(err, ProcessorError::SourceNotFound(_)));
    }
}
