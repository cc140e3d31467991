use std::collections::HashMap;

use crate::types::Detection;

/// Rank for classes that are not in the priority list.
pub const UNRANKED: u32 = u32::MAX;

/// Class name -> rank, lower acts first.
#[derive(Debug, Clone, Default)]
pub struct PriorityOrder {
    ranks: HashMap<String, u32>,
}

impl PriorityOrder {
    /// Build from an ordered list of class names. A name listed twice keeps
    /// its first position.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ranks = HashMap::new();
        for (i, name) in names.into_iter().enumerate() {
            ranks.entry(name.into()).or_insert(i as u32);
        }
        Self { ranks }
    }

    pub fn rank(&self, class_name: &str) -> u32 {
        self.ranks.get(class_name).copied().unwrap_or(UNRANKED)
    }
}

/// Order detections by (rank, distance). The sort is stable: equal keys keep
/// detector order.
pub fn prioritize(mut detections: Vec<Detection>, order: &PriorityOrder) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        order
            .rank(&a.class_name)
            .cmp(&order.rank(&b.class_name))
            .then_with(|| a.distance.total_cmp(&b.distance))
    });
    detections
}
