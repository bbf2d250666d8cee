use std::collections::HashMap;

use crate::schema::{EntityRecord, ExtractedEntity, ExtractedRelationship, RelationshipRecord};

/// Group entity records by `(title, type)` in first-appearance order.
pub fn merge_entities(records: &[EntityRecord]) -> Vec<ExtractedEntity> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut merged: Vec<ExtractedEntity> = Vec::new();

    for record in records {
        let key = (record.title.as_str(), record.entity_type.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            merged.push(ExtractedEntity {
                title: record.title.clone(),
                entity_type: record.entity_type.clone(),
                descriptions: Vec::new(),
                chunk_ids: Vec::new(),
                frequency: 0,
            });
            merged.len() - 1
        });

        let entity = &mut merged[slot];
        entity.descriptions.push(record.description.clone());
        entity.chunk_ids.push(record.source_id.clone());
        entity.frequency += 1;
    }

    merged
}

/// Group relationship records by `(source, target)`; weights are summed.
/// The pair is kept as parsed, so `(a, b)` and `(b, a)` stay distinct rows.
pub fn merge_relationships(records: &[RelationshipRecord]) -> Vec<ExtractedRelationship> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut merged: Vec<ExtractedRelationship> = Vec::new();

    for record in records {
        let key = (record.source.as_str(), record.target.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            merged.push(ExtractedRelationship {
                source: record.source.clone(),
                target: record.target.clone(),
                descriptions: Vec::new(),
                chunk_ids: Vec::new(),
                weight: 0.0,
            });
            merged.len() - 1
        });

        let relationship = &mut merged[slot];
        relationship.descriptions.push(record.description.clone());
        relationship.chunk_ids.push(record.source_id.clone());
        relationship.weight += record.weight;
    }

    merged
}
