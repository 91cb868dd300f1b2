use crate::{ErrorCode, ErrorContext, GhgpError};
use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;

impl From<DataFusionError> for GhgpError {
    fn from(err: DataFusionError) -> Self {
        match &err {
            DataFusionError::SchemaError(schema_err, _) => match schema_err.as_ref() {
                datafusion::common::SchemaError::FieldNotFound {
                    field,
                    valid_fields,
                } => {
                    let available: Vec<String> =
                        valid_fields.iter().map(|f| f.name.clone()).collect();
                    let closest = find_closest_match(&field.name, &available);

                    let mut error = GhgpError::new(
                        ErrorCode::QueryExecution,
                        format!("Field '{}' not found in snapshot", field.name),
                    )
                    .with_context(ErrorContext::FieldNotFound {
                        field: field.name.clone(),
                        available_fields: available,
                    });

                    if let Some(closest) = closest {
                        error = error.with_hint(format!("Dataset has '{}'", closest));
                    }
                    error
                }
                _ => GhgpError::new(ErrorCode::QueryExecution, schema_err.to_string()),
            },
            DataFusionError::ResourcesExhausted(msg) => {
                GhgpError::new(ErrorCode::QueryExecution, msg.clone())
                    .with_hint("Raise query.memory_limit_mb")
            }
            _ => GhgpError::new(ErrorCode::QueryExecution, err.to_string()),
        }
    }
}

impl From<ArrowError> for GhgpError {
    fn from(err: ArrowError) -> Self {
        GhgpError::new(ErrorCode::QueryExecution, err.to_string())
    }
}

impl From<std::io::Error> for GhgpError {
    fn from(err: std::io::Error) -> Self {
        GhgpError::new(ErrorCode::InternalPanic, err.to_string())
    }
}

impl From<serde_json::Error> for GhgpError {
    fn from(err: serde_json::Error) -> Self {
        GhgpError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

// Snapshot schemas drift between releases (e.g. `facility_id` vs `pgm_sys_id`),
// so a near match is worth reporting.
fn find_closest_match(target: &str, options: &[String]) -> Option<String> {
    options
        .iter()
        .map(|option| (levenshtein(target, option), option))
        .filter(|(distance, _)| *distance <= 3)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, option)| option.clone())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
