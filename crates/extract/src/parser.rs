use regex::Regex;
use std::sync::LazyLock;

use crate::prompt::Delimiters;
use crate::schema::{EntityRecord, RelationshipRecord};

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f-\x9f]").expect("control character pattern"));

/// Unescape HTML entities, trim, and drop control characters.
pub fn clean_str(text: &str) -> String {
    let unescaped = html_escape::decode_html_entities(text.trim());
    CONTROL_CHARS.replace_all(&unescaped, "").into_owned()
}

fn record_kind(field: &str) -> String {
    clean_str(field).trim_matches('"').trim().to_lowercase()
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedRecords {
    pub entities: Vec<EntityRecord>,
    pub relationships: Vec<RelationshipRecord>,
}

/// Best-effort parse of one chunk's raw model output. Malformed records are
/// skipped.
pub fn parse_records(raw: &str, chunk_id: &str, delimiters: &Delimiters) -> ParsedRecords {
    let mut parsed = ParsedRecords::default();

    let body = if delimiters.completion.is_empty() {
        raw.to_string()
    } else {
        raw.replace(&delimiters.completion, "")
    };

    for record in body.split(delimiters.record.as_str()) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }

        let record = record.strip_prefix('(').unwrap_or(record);
        let record = record.strip_suffix(')').unwrap_or(record);
        let fields: Vec<&str> = record.split(delimiters.tuple.as_str()).collect();
        if fields.len() < 4 {
            continue;
        }

        match record_kind(fields[0]).as_str() {
            "entity" => parsed.entities.push(EntityRecord {
                title: clean_str(fields[1]).to_uppercase(),
                entity_type: clean_str(fields[2]).to_uppercase(),
                description: clean_str(fields[3]),
                source_id: chunk_id.to_string(),
            }),
            "relationship" if fields.len() >= 5 => {
                let weight = fields
                    .last()
                    .and_then(|w| clean_str(w).parse::<f64>().ok())
                    .unwrap_or(1.0);

                parsed.relationships.push(RelationshipRecord {
                    source: clean_str(fields[1]).to_uppercase(),
                    target: clean_str(fields[2]).to_uppercase(),
                    description: clean_str(fields[3]),
                    weight,
                    source_id: chunk_id.to_string(),
                });
            }
            _ => {}
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(raw: &str) -> ParsedRecords {
        parse_records(raw, "c1", &Delimiters::default())
    }

    #[test]
    fn test_parses_entities_and_relationships() {
        let raw = concat!(
            r#"("entity"<|>acme<|>organization<|>maker of widgets)"#,
            "##\n",
            r#"("entity"<|>Bob<|>person<|>ACME founder)"#,
            "##\n",
            r#"("relationship"<|>bob<|>acme<|>Bob founded ACME<|>8)"#,
            "\n<|COMPLETE|>"
        );
        let parsed = parse(raw);

        assert_eq!(parsed.entities.len(), 2);
        assert_eq!(parsed.entities[0].title, "ACME");
        assert_eq!(parsed.entities[0].entity_type, "ORGANIZATION");
        assert_eq!(parsed.entities[0].description, "maker of widgets");
        assert_eq!(parsed.entities[0].source_id, "c1");

        assert_eq!(parsed.relationships.len(), 1);
        let rel = &parsed.relationships[0];
        assert_eq!((rel.source.as_str(), rel.target.as_str()), ("BOB", "ACME"));
        assert_eq!(rel.description, "Bob founded ACME");
        assert_eq!(rel.weight, 8.0);
    }

    #[test]
    fn test_weight_defaults_to_one() {
        let parsed = parse(r#"("relationship"<|>a<|>b<|>linked<|>strong)"#);
        assert_eq!(parsed.relationships[0].weight, 1.0);
    }

    #[test]
    fn test_weight_uses_last_field() {
        let parsed = parse(r#"("relationship"<|>a<|>b<|>linked<|>extra<|>2.5)"#);
        assert_eq!(parsed.relationships[0].weight, 2.5);
        assert_eq!(parsed.relationships[0].description, "linked");
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        let raw = concat!(
            r#"("entity"<|>only<|>two)"#,
            "##",
            r#"("relationship"<|>a<|>b<|>four fields)"#,
            "##",
            r#"("event"<|>x<|>y<|>z<|>w)"#,
            "##",
            "garbage without delimiters",
            "##   ##"
        );
        assert_eq!(parse(raw), ParsedRecords::default());
    }

    #[test]
    fn test_kind_is_case_and_quote_insensitive() {
        let parsed = parse(r#"( 'Entity' <|>x<|>geo<|>somewhere)##(ENTITY<|>y<|>geo<|>elsewhere)"#);
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.entities[0].title, "Y");

        let parsed = parse(r#"(" Entity "<|>x<|>geo<|>somewhere)"#);
        assert_eq!(parsed.entities[0].title, "X");
    }

    #[test]
    fn test_clean_str() {
        assert_eq!(clean_str("  Tom &amp; Jerry\u{0007} "), "Tom & Jerry");
        assert_eq!(clean_str("a\u{0085}b\tc"), "abc");
        assert_eq!(clean_str("&lt;tag&gt;"), "<tag>");
    }

    #[test]
    fn test_custom_delimiters() {
        let delimiters = Delimiters {
            tuple: " : ".to_string(),
            record: "\n".to_string(),
            completion: "\n\n".to_string(),
        };
        let parsed = parse_records("entity : x : geo : a place\n", "c9", &delimiters);
        assert_eq!(parsed.entities[0].title, "X");
        assert_eq!(parsed.entities[0].source_id, "c9");
    }
}
