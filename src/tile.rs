use crate::biome::{self, Biome};
use crate::grid::{LocalCoord, TileId};
use crate::heightmap::Heightmap;
use crate::hydrology::HydrologyState;

/// Тайл: квадратная сетка сэмплов высоты с влажностью, биомами и кешем гидрологии
#[derive(Debug, Clone)]
pub struct Tile {
    pub id: TileId,
    pub elevation: Heightmap,
    pub moisture: Vec<f32>,
    pub biomes: Vec<Biome>,
    /// Преобладающий биом тайла
    pub biome: Biome,
    pub hydrology: HydrologyState,
}

impl Tile {
    #[must_use]
    pub fn new(id: TileId, elevation: Heightmap, moisture: Vec<f32>, biomes: Vec<Biome>) -> Self {
        debug_assert_eq!(elevation.width, elevation.height);
        debug_assert_eq!(elevation.data.len(), moisture.len());
        debug_assert_eq!(elevation.data.len(), biomes.len());
        let biome = biome::dominant(&biomes);
        Self {
            id,
            elevation,
            moisture,
            biomes,
            biome,
            hydrology: HydrologyState::dirty(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.elevation.width as usize
    }

    #[must_use]
    pub fn index(&self, local: LocalCoord) -> usize {
        local.y * self.size() + local.x
    }

    #[must_use]
    pub fn local(&self, index: usize) -> LocalCoord {
        LocalCoord::new(index % self.size(), index / self.size())
    }

    #[must_use]
    pub fn elevation_at(&self, local: LocalCoord) -> f32 {
        self.elevation.data[self.index(local)]
    }

    #[must_use]
    pub fn biome_at(&self, local: LocalCoord) -> Biome {
        self.biomes[self.index(local)]
    }

    pub(crate) fn refresh_biome(&mut self) {
        self.biome = biome::dominant(&self.biomes);
    }
}
