use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Biome {
    Plains,
    Hills,
    Mountains,
    Forest,
    Swamp,
    Desert,
}

impl Biome {
    pub const ALL: [Biome; 6] = [
        Biome::Plains,
        Biome::Hills,
        Biome::Mountains,
        Biome::Forest,
        Biome::Swamp,
        Biome::Desert,
    ];

    #[must_use]
    pub fn to_rgb(&self) -> [u8; 3] {
        match self {
            Biome::Plains => [150, 200, 100],
            Biome::Hills => [170, 160, 110],
            Biome::Mountains => [150, 150, 150],
            Biome::Forest => [60, 120, 60],
            Biome::Swamp => [80, 100, 60],
            Biome::Desert => [200, 180, 120],
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Biome::Plains => "plains",
            Biome::Hills => "hills",
            Biome::Mountains => "mountains",
            Biome::Forest => "forest",
            Biome::Swamp => "swamp",
            Biome::Desert => "desert",
        }
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Назначает биом по нормированной высоте (0..1) и влажности (0..1)
#[must_use]
pub fn classify(elevation: f32, moisture: f32) -> Biome {
    // 1. Высокогорье не зависит от влажности
    if elevation > 0.72 {
        return Biome::Mountains;
    }
    if elevation > 0.5 {
        return if moisture > 0.65 {
            Biome::Forest
        } else {
            Biome::Hills
        };
    }

    // 2. Низины: распределение по влажности
    if moisture < 0.3 {
        Biome::Desert
    } else if moisture > 0.7 && elevation < 0.3 {
        Biome::Swamp
    } else if moisture > 0.55 {
        Biome::Forest
    } else {
        Biome::Plains
    }
}

/// Переводит абсолютную высоту в нормированную шкалу генератора
#[derive(Debug, Clone, Copy)]
pub struct BiomeClassifier {
    floor: f32,
    scale: f32,
}

impl BiomeClassifier {
    #[must_use]
    pub fn new(floor: f32, scale: f32) -> Self {
        Self {
            floor,
            scale: scale.max(f32::EPSILON),
        }
    }

    #[must_use]
    pub fn normalize(&self, elevation: f32) -> f32 {
        ((elevation - self.floor) / self.scale).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn classify(&self, elevation: f32, moisture: f32) -> Biome {
        classify(self.normalize(elevation), moisture)
    }
}

/// Самый частый биом; при равенстве побеждает ранний в `Biome::ALL`
#[must_use]
pub fn dominant(biomes: &[Biome]) -> Biome {
    let mut counts = [0usize; Biome::ALL.len()];
    for &b in biomes {
        counts[b as usize] += 1;
    }
    let mut best = 0;
    for (i, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = i;
        }
    }
    Biome::ALL[best]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_cover_all_biomes() {
        assert_eq!(classify(0.9, 0.5), Biome::Mountains);
        assert_eq!(classify(0.6, 0.2), Biome::Hills);
        assert_eq!(classify(0.6, 0.8), Biome::Forest);
        assert_eq!(classify(0.2, 0.1), Biome::Desert);
        assert_eq!(classify(0.2, 0.9), Biome::Swamp);
        assert_eq!(classify(0.4, 0.9), Biome::Forest);
        assert_eq!(classify(0.4, 0.45), Biome::Plains);
    }

    #[test]
    fn classifier_normalizes_against_generation_range() {
        let classifier = BiomeClassifier::new(0.0, 2000.0);
        assert_eq!(classifier.classify(1900.0, 0.5), Biome::Mountains);
        assert_eq!(classifier.classify(-50.0, 0.45), Biome::Plains);
    }

    #[test]
    fn dominant_breaks_ties_by_declaration_order() {
        let biomes = [Biome::Desert, Biome::Hills, Biome::Desert, Biome::Hills];
        assert_eq!(dominant(&biomes), Biome::Hills);
        assert_eq!(dominant(&[]), Biome::Plains);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Biome::Mountains).unwrap(), "\"mountains\"");
    }
}
