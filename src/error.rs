// src/error.rs
//! Ошибки движка карты мира
//!
//! Каждая ошибка относится ровно к одному запросу: ни одна из них не фатальна для процесса.
//! Нестабильная гидрология сюда не входит: это предупреждение рядом с частично
//! пригодным результатом (см. [`crate::hydrology::HydrologyWarning`]).

use crate::grid::{SampleCoord, TileId};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapError>;

/// Категория ошибки для транспортного слоя
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Некорректный ввод, состояние не тронуто
    Validation,
    /// Ссылка на тайл/POI/мир не разрешилась
    NotFound,
    /// Несогласованная операция (например, пропуск кольца)
    Conflict,
    /// Маршрутизатор не нашёл пути
    Unreachable,
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("seed must be a non-empty string matching the world seed (got {0:?})")]
    InvalidSeed(String),

    #[error("ring {ring} cannot be expanded: rings must be >= 1 and contiguous (current max ring {max_ring})")]
    InvalidRing { ring: u32, max_ring: u32 },

    #[error("invalid brush: {0}")]
    InvalidBrush(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("tile {0} has not been generated")]
    TileNotFound(TileId),

    #[error("poi {0:?} does not exist")]
    PoiNotFound(String),

    #[error("world {0:?} does not exist")]
    WorldNotFound(String),

    #[error("sample {0} lies outside the generated world")]
    OutOfBounds(SampleCoord),

    #[error("no suitable site within {radius_km} km (best score {best_score:.3})")]
    NoSuitableSite { radius_km: f32, best_score: f32 },

    #[error("no path between {from} and {to}")]
    NoPath { from: String, to: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MapError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            MapError::InvalidSeed(_)
            | MapError::InvalidBrush(_)
            | MapError::Validation(_)
            | MapError::Config(_)
            | MapError::Io(_) => ErrorKind::Validation,
            MapError::TileNotFound(_)
            | MapError::PoiNotFound(_)
            | MapError::WorldNotFound(_)
            | MapError::OutOfBounds(_)
            | MapError::NoSuitableSite { .. } => ErrorKind::NotFound,
            MapError::InvalidRing { .. } | MapError::Conflict(_) => ErrorKind::Conflict,
            MapError::NoPath { .. } => ErrorKind::Unreachable,
        }
    }
}

impl From<toml::de::Error> for MapError {
    fn from(value: toml::de::Error) -> Self {
        MapError::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(MapError::InvalidSeed(String::new()).kind(), ErrorKind::Validation);
        assert_eq!(
            MapError::TileNotFound(TileId::new(3, 0)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            MapError::InvalidRing { ring: 3, max_ring: 1 }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            MapError::NoPath {
                from: "a".into(),
                to: "b".into()
            }
            .kind(),
            ErrorKind::Unreachable
        );
    }

    #[test]
    fn messages_name_the_tile() {
        let err = MapError::TileNotFound(TileId::new(-1, 2));
        assert_eq!(err.to_string(), "tile -1:2 has not been generated");
    }
}
