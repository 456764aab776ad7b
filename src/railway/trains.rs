use std::collections::HashMap;

use crate::railway::TrainId;
use crate::{RailError, Result};

#[derive(Debug, Clone)]
pub struct Train {
    pub name: String,
    pub length: f64,
    pub max_speed: f64,
    pub acceleration: f64,
    pub deceleration: f64,
    /// Train integrity monitoring on board.
    pub tim: bool,
}

/// Append-only catalogue of trains, keyed by name. Indices are shared with
/// the timetable's schedule vector.
#[derive(Debug, Default)]
pub struct TrainList {
    trains: Vec<Train>,
    name_to_index: HashMap<String, TrainId>,
}

impl TrainList {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_train(
        &mut self,
        name: &str,
        length: f64,
        max_speed: f64,
        acceleration: f64,
        deceleration: f64,
        tim: bool,
    ) -> Result<TrainId> {
        if self.name_to_index.contains_key(name) {
            return Err(RailError::Duplicate(format!("train {}", name)));
        }
        if length <= 0.0 {
            return Err(RailError::InvalidInput("train length must be positive".to_string()));
        }
        if max_speed <= 0.0 {
            return Err(RailError::InvalidInput("train max speed must be positive".to_string()));
        }
        if acceleration <= 0.0 || deceleration <= 0.0 {
            return Err(RailError::InvalidInput(
                "train acceleration and deceleration must be positive".to_string(),
            ));
        }
        let index = self.trains.len();
        self.trains.push(Train {
            name: name.to_string(),
            length,
            max_speed,
            acceleration,
            deceleration,
            tim,
        });
        self.name_to_index.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn size(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    pub fn has_train_index(&self, tr: TrainId) -> bool {
        tr < self.trains.len()
    }

    pub fn has_train(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub fn get_train(&self, tr: TrainId) -> Result<&Train> {
        self.trains
            .get(tr)
            .ok_or_else(|| RailError::NotFound(format!("train index {}", tr)))
    }

    pub fn get_train_index(&self, name: &str) -> Result<TrainId> {
        self.name_to_index
            .get(name)
            .cloned()
            .ok_or_else(|| RailError::NotFound(format!("train {}", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Train> {
        self.trains.iter()
    }
}
