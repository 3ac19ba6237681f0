//! Metrics response grammar parser.
//!
//! Each non-empty query response is newline-separated rows of the form:
//!
//! ```text
//! {component1="value1",component2="value2",...} => <value> @[<timestamp>]
//! ```
//!
//! An entirely-empty result is a body of exactly `{}`. Components may
//! appear in any order inside the braces; values are double-quoted with
//! `\"` and `\\` escapes. Parsing is pure: text in, keys out. A malformed
//! or truncated row degrades the sample (that entity may be missed) but
//! never fails it.

use std::collections::BTreeSet;

use crate::key::{EntityKey, LabelSchema};

/// The set of entity keys parsed from one query response at one time
/// offset. Ephemeral; exists only for one step's processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSet {
    depth: usize,
    keys: BTreeSet<EntityKey>,
}

impl SampleSet {
    /// Parse a full response body under `schema`.
    ///
    /// Rows are projected onto the schema's component order by label
    /// name, never by position in the input. Empty-result markers and
    /// unparseable rows contribute no keys.
    pub fn parse(text: &str, schema: &LabelSchema) -> Self {
        let mut keys = BTreeSet::new();
        for line in text.lines() {
            if let Row::Entity(key) = parse_row(line, schema) {
                keys.insert(key);
            }
        }
        Self { depth: schema.depth(), keys }
    }

    /// Build a sample set directly from keys (test fixtures, mostly).
    pub fn from_keys<I: IntoIterator<Item = EntityKey>>(depth: usize, keys: I) -> Self {
        let keys: BTreeSet<EntityKey> = keys
            .into_iter()
            .inspect(|k| debug_assert_eq!(k.depth(), depth))
            .collect();
        Self { depth, keys }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityKey> {
        self.keys.iter()
    }
}

/// Outcome of parsing a single response row.
#[derive(Debug, PartialEq)]
enum Row {
    /// A data row projected onto the schema.
    Entity(EntityKey),
    /// The `{}` empty-result marker (a normal "nothing matched" signal).
    Empty,
    /// Blank, truncated, or otherwise unusable. Skipped, never fatal.
    Skip,
}

/// Parse one row and project its labels onto `schema` order.
fn parse_row(line: &str, schema: &LabelSchema) -> Row {
    let line = line.trim();
    if line.is_empty() {
        return Row::Skip;
    }
    if line == "{}" {
        return Row::Empty;
    }

    let Some((labels, rest)) = parse_label_block(line) else {
        return Row::Skip;
    };

    // The value part is required for a well-formed data row. The value
    // itself is not used for narrowing (the query already encodes the
    // zero-activity predicate); the timestamp suffix is ignored.
    let rest = rest.trim_start();
    let Some(value_part) = rest.strip_prefix("=>") else {
        return Row::Skip;
    };
    let value_token = value_part.trim_start().split_whitespace().next();
    match value_token {
        Some(tok) if tok.parse::<f64>().is_ok() => {}
        _ => return Row::Skip,
    }

    // Project by name, in schema order.
    let mut components = Vec::with_capacity(schema.depth());
    for name in schema.components() {
        match labels.iter().find(|(k, _)| k == name) {
            Some((_, v)) => components.push(v.clone()),
            None => return Row::Skip,
        }
    }
    Row::Entity(EntityKey::new(components))
}

/// Parse the leading `{name="value",...}` block.
///
/// Returns the label pairs and the remainder of the line after the
/// closing brace, or `None` if the block is malformed or truncated.
fn parse_label_block(line: &str) -> Option<(Vec<(String, String)>, &str)> {
    let inner = line.strip_prefix('{')?;
    let mut labels = Vec::new();
    let mut chars = inner.char_indices().peekable();

    loop {
        // Skip whitespace between pairs.
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }

        match chars.peek() {
            Some((i, '}')) => {
                let end = *i;
                chars.next();
                return Some((labels, &inner[end + 1..]));
            }
            Some(_) => {}
            None => return None, // Truncated before the closing brace.
        }

        // Label name: everything up to '='.
        let name_start = chars.peek()?.0;
        let mut name_end = name_start;
        loop {
            match chars.next() {
                Some((i, '=')) => {
                    name_end = i;
                    break;
                }
                Some((_, '"' | ',' | '}')) => return None,
                Some(_) => {}
                None => return None,
            }
        }
        let name = inner[name_start..name_end].trim().to_string();
        if name.is_empty() {
            return None;
        }

        // Quoted value with escape handling.
        match chars.next() {
            Some((_, '"')) => {}
            _ => return None,
        }
        let mut value = String::new();
        loop {
            match chars.next() {
                Some((_, '\\')) => match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => return None,
                },
                Some((_, '"')) => break,
                Some((_, c)) => value.push(c),
                None => return None,
            }
        }
        labels.push((name, value));

        // Separator or end of block.
        match chars.peek() {
            Some((_, ',')) => {
                chars.next();
            }
            Some((_, '}')) => {}
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> LabelSchema {
        LabelSchema::workload()
    }

    #[test]
    fn parses_data_row() {
        let row = parse_row(
            r#"{namespace="ops",pod="worker-1"} => 0 @[1700000000.123]"#,
            &workload(),
        );
        assert_eq!(row, Row::Entity(EntityKey::from(["ops", "worker-1"])));
    }

    #[test]
    fn empty_result_marker() {
        assert_eq!(parse_row("{}", &workload()), Row::Empty);
    }

    #[test]
    fn label_order_does_not_affect_output() {
        // Regression: the projection is by name, never by position.
        let forward = parse_row(
            r#"{namespace="ops",pod="worker-1"} => 0 @[1700000000]"#,
            &workload(),
        );
        let reversed = parse_row(
            r#"{pod="worker-1",namespace="ops"} => 0 @[1700000000]"#,
            &workload(),
        );
        assert_eq!(forward, reversed);
        assert_eq!(
            forward,
            Row::Entity(EntityKey::from(["ops", "worker-1"]))
        );
    }

    #[test]
    fn extra_labels_are_ignored() {
        let row = parse_row(
            r#"{instance="10.0.0.1:9100",namespace="ops",job="kubelet",pod="worker-1"} => 0 @[1700000000]"#,
            &workload(),
        );
        assert_eq!(row, Row::Entity(EntityKey::from(["ops", "worker-1"])));
    }

    #[test]
    fn missing_component_skips_row() {
        let row = parse_row(r#"{namespace="ops"} => 0 @[1700000000]"#, &workload());
        assert_eq!(row, Row::Skip);
    }

    #[test]
    fn escaped_quote_in_value() {
        let schema = LabelSchema::new(["namespace", "pod"]);
        let row = parse_row(
            r#"{namespace="ops",pod="we\"ird"} => 0 @[1700000000]"#,
            &schema,
        );
        assert_eq!(row, Row::Entity(EntityKey::from(["ops", "we\"ird"])));
    }

    #[test]
    fn truncated_rows_are_skipped() {
        for line in [
            r#"{namespace="ops",pod="worker-1"#,
            r#"{namespace="ops",pod="worker-1"}"#,
            r#"{namespace="ops",pod="worker-1"} => "#,
            r#"{namespace="ops",pod="worker-1"} => zero"#,
            r#"namespace="ops",pod="worker-1" => 0"#,
            r#"{namespace=ops} => 0"#,
        ] {
            assert_eq!(parse_row(line, &workload()), Row::Skip, "line: {line}");
        }
    }

    #[test]
    fn sample_set_from_response_body() {
        let body = concat!(
            "{namespace=\"ns1\",pod=\"podA\"} => 0 @[1700000000]\n",
            "{namespace=\"ns1\",pod=\"podB\"} => 0 @[1700000000]\n",
            "{namespace=\"ns2\",pod=\"podC\"} => 0 @[1700000000]\n",
        );
        let sample = SampleSet::parse(body, &workload());
        assert_eq!(sample.len(), 3);
        assert!(sample.contains(&EntityKey::from(["ns2", "podC"])));
    }

    #[test]
    fn malformed_row_degrades_but_does_not_fail() {
        let body = concat!(
            "{namespace=\"ns1\",pod=\"podA\"} => 0 @[1700000000]\n",
            "{namespace=\"ns1\",pod=\"podB\n",
            "{namespace=\"ns2\",pod=\"podC\"} => 0 @[1700000000]\n",
        );
        let sample = SampleSet::parse(body, &workload());
        assert_eq!(sample.len(), 2);
        assert!(!sample.contains(&EntityKey::from(["ns1", "podB"])));
    }

    #[test]
    fn empty_body_yields_empty_sample() {
        assert!(SampleSet::parse("{}", &workload()).is_empty());
        assert!(SampleSet::parse("", &workload()).is_empty());
    }

    #[test]
    fn depth_four_route_rows() {
        let schema = LabelSchema::route();
        let body = concat!(
            "{exported_namespace=\"polo\",host=\"polo-stage.test.com\",",
            "ingress=\"polo-api-staging\",path=\"/\"} => 0 @[1700000000]\n",
        );
        let sample = SampleSet::parse(body, &schema);
        assert_eq!(sample.len(), 1);
        assert!(sample.contains(&EntityKey::from([
            "polo",
            "polo-api-staging",
            "polo-stage.test.com",
            "/",
        ])));
    }

    #[test]
    fn duplicate_rows_collapse() {
        let body = concat!(
            "{namespace=\"ns1\",pod=\"podA\"} => 0 @[1700000000]\n",
            "{namespace=\"ns1\",pod=\"podA\"} => 0 @[1700000000]\n",
        );
        assert_eq!(SampleSet::parse(body, &workload()).len(), 1);
    }

    #[test]
    fn bare_timestamp_suffix_accepted() {
        let row = parse_row(
            r#"{namespace="ops",pod="worker-1"} => 0 @1700000000.123"#,
            &workload(),
        );
        assert_eq!(row, Row::Entity(EntityKey::from(["ops", "worker-1"])));
    }
}
