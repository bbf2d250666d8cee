use serde::{Deserialize, Serialize};

pub const DEFAULT_ENTITY_TYPES: [&str; 4] = ["organization", "person", "geo", "event"];

pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"-Goal-
Given a text document and a list of entity types, identify all entities of those types from the text and all relationships among the identified entities.

-Steps-
1. Identify all entities. For each identified entity, extract the following information:
- entity_name: Name of the entity, capitalized
- entity_type: One of the following types: [{entity_types}]
- entity_description: Comprehensive description of the entity's attributes and activities
Format each entity as ("entity"{tuple_delimiter}<entity_name>{tuple_delimiter}<entity_type>{tuple_delimiter}<entity_description>)

2. From the entities identified in step 1, identify all pairs of (source_entity, target_entity) that are *clearly related* to each other.
For each pair of related entities, extract the following information:
- source_entity: name of the source entity, as identified in step 1
- target_entity: name of the target entity, as identified in step 1
- relationship_description: explanation as to why you think the source entity and the target entity are related to each other
- relationship_strength: a numeric score indicating strength of the relationship between the source entity and target entity
Format each relationship as ("relationship"{tuple_delimiter}<source_entity>{tuple_delimiter}<target_entity>{tuple_delimiter}<relationship_description>{tuple_delimiter}<relationship_strength>)

3. Return output as a single list of all the entities and relationships identified in steps 1 and 2. Use **{record_delimiter}** as the list delimiter.

4. When finished, output {completion_delimiter}

-Real Data-
Entity_types: {entity_types}
Text: {input_text}
Output:"#;

pub const CONTINUE_PROMPT: &str = "MANY entities and relationships were missed in the last extraction. Remember to ONLY emit entities that match any of the previously extracted types. Add them below using the same format:\n";

pub const LOOP_PROMPT: &str = "It appears some entities and relationships may have still been missed. Answer Y if there are still entities or relationships that need to be added, or N if there are none. Please answer with a single letter Y or N.\n";

/// Separator placed between chunk texts in a batched prompt and expected
/// between the per-chunk sections of the response.
pub fn batch_separator() -> String {
    format!("\n{}\n", "-".repeat(50))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delimiters {
    pub tuple: String,
    pub record: String,
    pub completion: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            tuple: "<|>".to_string(),
            record: "##".to_string(),
            completion: "<|COMPLETE|>".to_string(),
        }
    }
}

/// Fill the extraction template's placeholders for one input text.
pub fn build_extraction_prompt(
    template: &str,
    entity_types: &[String],
    delimiters: &Delimiters,
    input_text: &str,
) -> String {
    template
        .replace("{entity_types}", &entity_types.join(","))
        .replace("{tuple_delimiter}", &delimiters.tuple)
        .replace("{record_delimiter}", &delimiters.record)
        .replace("{completion_delimiter}", &delimiters.completion)
        .replace("{input_text}", input_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_extraction_prompt_fills_placeholders() {
        let types = vec!["person".to_string(), "geo".to_string()];
        let prompt = build_extraction_prompt(
            DEFAULT_EXTRACTION_PROMPT,
            &types,
            &Delimiters::default(),
            "Alice lives in Paris.",
        );

        assert!(prompt.contains("Entity_types: person,geo"));
        assert!(prompt.contains("Text: Alice lives in Paris."));
        assert!(prompt.contains("(\"entity\"<|><entity_name>"));
        assert!(prompt.contains("output <|COMPLETE|>"));
        assert!(!prompt.contains("{input_text}"));
    }

    #[test]
    fn test_input_text_braces_survive() {
        let prompt = build_extraction_prompt(
            "{input_text}",
            &[],
            &Delimiters::default(),
            "fn main() { {tuple} }",
        );
        assert_eq!(prompt, "fn main() { {tuple} }");
    }

    #[test]
    fn test_batch_separator() {
        let sep = batch_separator();
        assert_eq!(sep.len(), 52);
        assert!(sep.starts_with("\n---"));
    }
}
