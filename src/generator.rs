// src/generator.rs
//! Детерминированная генерация тайлов
//!
//! Высота тайла есть чистая функция от (сид, позиция тайла):
//! - несколько октав когерентного шума OpenSimplex2 в **глобальных** координатах сэмплов,
//!   поэтому соседние тайлы стыкуются без швов;
//! - частота удваивается, амплитуда уменьшается вдвое на каждой октаве,
//!   сид октавы равен хешу (сид мира, номер октавы);
//! - посэмпловая шероховатость из ChaCha, засеянного хешем (сид мира, позиция тайла);
//! - биом берётся из нормированной высоты и независимого канала влажности.
//!
//! Никакой энтропии извне: повторная генерация даёт побайтно тот же тайл.

use crate::biome::BiomeClassifier;
use crate::config::{EngineConfig, GenerationSettings};
use crate::error::{MapError, Result};
use crate::grid::{GridIndex, TileId};
use crate::heightmap::Heightmap;
use crate::tile::Tile;
use fastnoise_lite::{FastNoiseLite, NoiseType};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use xxhash_rust::xxh64::xxh64;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const MOISTURE_SALT: u64 = 0x6d6f_6973_7475_7265;
const TILE_SALT: u64 = 0x7469_6c65;

/// Стабильный хеш строкового сида
#[must_use]
pub fn seed_hash(seed: &str) -> u64 {
    xxh64(seed.as_bytes(), 0)
}

/// Производный хеш для независимого канала случайности
#[must_use]
pub fn derive_hash(base: u64, salt: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&base.to_le_bytes());
    bytes[8..].copy_from_slice(&salt.to_le_bytes());
    xxh64(&bytes, 0)
}

fn tile_salt(id: TileId) -> u64 {
    let packed = (u64::from(id.x as u32) << 32) | u64::from(id.y as u32);
    derive_hash(TILE_SALT, packed)
}

fn noise_layer(seed: u64, frequency: f32) -> FastNoiseLite {
    let mut noise = FastNoiseLite::with_seed(seed as i32);
    noise.set_noise_type(Some(NoiseType::OpenSimplex2));
    noise.set_frequency(Some(frequency));
    noise
}

pub struct WorldGenerator {
    seed: String,
    seed_hash: u64,
    tile_size: u32,
    settings: GenerationSettings,
    min_elevation: f32,
    max_elevation: f32,
    octaves: Vec<(FastNoiseLite, f32)>,
    moisture: FastNoiseLite,
    classifier: BiomeClassifier,
}

impl WorldGenerator {
    pub fn new(seed: &str, config: &EngineConfig) -> Result<Self> {
        if seed.is_empty() {
            return Err(MapError::InvalidSeed(seed.to_string()));
        }
        let settings = config.generation.clone();
        let hash = seed_hash(seed);

        let mut octaves = Vec::with_capacity(settings.octaves as usize);
        let mut frequency = settings.base_frequency;
        let mut amplitude = 1.0;
        for octave in 0..settings.octaves {
            let layer_seed = derive_hash(hash, u64::from(octave) + 1);
            octaves.push((noise_layer(layer_seed, frequency), amplitude));
            frequency *= 2.0;
            amplitude *= 0.5;
        }
        let moisture = noise_layer(
            derive_hash(hash, MOISTURE_SALT),
            settings.moisture_frequency,
        );

        Ok(Self {
            seed: seed.to_string(),
            seed_hash: hash,
            tile_size: config.tile_size,
            classifier: BiomeClassifier::new(settings.elevation_floor, settings.height_scale),
            settings,
            min_elevation: config.min_elevation,
            max_elevation: config.max_elevation,
            octaves,
            moisture,
        })
    }

    #[must_use]
    pub fn seed(&self) -> &str {
        &self.seed
    }

    #[must_use]
    pub fn seed_hash(&self) -> u64 {
        self.seed_hash
    }

    /// Нормированная высота 0..1 в глобальной точке
    fn normalized_elevation(&self, gx: f32, gy: f32) -> f32 {
        let mut sum = 0.0;
        let mut total = 0.0;
        for (noise, amplitude) in &self.octaves {
            sum += amplitude * noise.get_noise_2d(gx, gy);
            total += amplitude;
        }
        let value = ((sum / total + 1.0) * 0.5).clamp(0.0, 1.0);
        value.powf(self.settings.elevation_power)
    }

    fn moisture_at(&self, gx: f32, gy: f32) -> f32 {
        ((self.moisture.get_noise_2d(gx, gy) + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Генерирует один тайл. Результат зависит только от сида и `id`.
    #[must_use]
    pub fn generate_tile(&self, id: TileId) -> Tile {
        let n = self.tile_size;
        let origin_x = id.x * n as i32;
        let origin_y = id.y * n as i32;
        let roughness = self.settings.roughness;
        let mut rng = ChaCha8Rng::seed_from_u64(derive_hash(self.seed_hash, tile_salt(id)));

        let count = (n * n) as usize;
        let mut elevation = Heightmap::new(n, n);
        let mut moisture = Vec::with_capacity(count);
        let mut biomes = Vec::with_capacity(count);

        for y in 0..n {
            for x in 0..n {
                let gx = (origin_x + x as i32) as f32;
                let gy = (origin_y + y as i32) as f32;

                let norm = self.normalized_elevation(gx, gy);
                let jitter = if roughness > 0.0 {
                    rng.gen_range(-roughness..=roughness)
                } else {
                    0.0
                };
                let h = (self.settings.elevation_floor + norm * self.settings.height_scale + jitter)
                    .clamp(self.min_elevation, self.max_elevation);
                elevation.set(x, y, h);

                let m = self.moisture_at(gx, gy);
                moisture.push(m);
                biomes.push(self.classifier.classify(h, m));
            }
        }

        Tile::new(id, elevation, moisture, biomes)
    }

    /// Генерирует все тайлы кольца в каноническом порядке
    #[must_use]
    pub fn generate_ring(&self, ring: u32) -> Vec<Tile> {
        let ids = GridIndex::tiles_in_ring(ring);

        #[cfg(feature = "parallel")]
        let tiles = ids.par_iter().map(|&id| self.generate_tile(id)).collect();
        #[cfg(not(feature = "parallel"))]
        let tiles = ids.iter().map(|&id| self.generate_tile(id)).collect();

        tiles
    }
}
