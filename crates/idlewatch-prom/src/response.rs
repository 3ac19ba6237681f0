//! Query API envelope decoding and instant-vector text rendering.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level `/api/v1/query` response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: serde_json::Value,
}

/// One instant-vector sample: a label set and a `[timestamp, "value"]`
/// pair.
#[derive(Debug, Deserialize)]
pub struct VectorSample {
    pub metric: BTreeMap<String, String>,
    pub value: (f64, String),
}

/// Render an instant vector into the row grammar:
///
/// ```text
/// {a="1",b="2"} => 0 @[1700000000.000]
/// ```
///
/// An empty vector renders as the `{}` empty-result marker. Label names
/// sort lexicographically; consumers project by name, so the order is a
/// rendering detail only.
pub fn render_instant_vector(samples: &[VectorSample]) -> String {
    if samples.is_empty() {
        return "{}".to_string();
    }

    let mut out = String::new();
    for sample in samples {
        out.push('{');
        for (i, (name, value)) in sample.metric.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_label_value(value));
            out.push('"');
        }
        out.push_str("} => ");
        out.push_str(&sample.value.1);
        out.push_str(&format!(" @[{:.3}]\n", sample.value.0));
    }
    out
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
