// src/hydrology.rs
//! Гидрология: направления стока, заполнение впадин, накопление потока
//!
//! Состояние тайла: `Clean → Dirty → Recomputing → Clean`.
//!
//! Пересчёт тайла:
//! 1. Каждый сэмпл стекает к самому низкому строго более низкому из 8 соседей
//!    (при равенстве порядок N, NE, E, SE, S, SW, W, NW). Соседи из других тайлов
//!    читаются по их поверхности стока. Нет более низкого соседа: сток (`Sink`).
//! 2. Внутренние стоки заполняются потоком приоритетов от краёв тайла: котловина
//!    поднимается до точки перелива с минимальным уклоном `fill_epsilon`.
//!    Итерации ограничены; при исчерпании выдаётся предупреждение, а не ошибка.
//! 3. Накопление: топологический проход по графу стока (petgraph):
//!    `1 + сумма притоков`, включая притоки из соседних тайлов.
//! 4. Тайлы, получившие изменившийся сток, помечаются грязными и (при распространении)
//!    пересчитываются в ширину до ограничения глубины.
//!
//! Исходные высоты не меняются: заполненная поверхность хранится в кеше гидрологии,
//! а сэмплы, поднятые заполнением глубже `lake_min_depth`, помечаются как озёра.

use crate::config::HydrologySettings;
use crate::error::{MapError, Result};
use crate::grid::{Dir8, SampleCoord, TileId};
use crate::store::HeightFieldStore;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HydroStatus {
    Clean,
    Dirty,
    Recomputing,
}

/// Направление стока сэмпла
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDir {
    Sink,
    To(Dir8),
}

/// Кеш гидрологии тайла; векторы пусты, пока тайл ни разу не пересчитывался
#[derive(Debug, Clone)]
pub struct HydrologyState {
    pub status: HydroStatus,
    pub flow: Vec<FlowDir>,
    pub accumulation: Vec<f32>,
    /// Поверхность стока после заполнения впадин
    pub filled: Vec<f32>,
    pub lake: Vec<bool>,
    /// Сток, переданный соседним тайлам: (локальный индекс источника, накопление)
    outflow: BTreeMap<TileId, Vec<(u32, f32)>>,
}

impl HydrologyState {
    #[must_use]
    pub fn dirty() -> Self {
        Self {
            status: HydroStatus::Dirty,
            flow: Vec::new(),
            accumulation: Vec::new(),
            filled: Vec::new(),
            lake: Vec::new(),
            outflow: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        !self.flow.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HydrologyWarning {
    /// Заполнение впадин не сошлось за отведённые итерации
    UnstableHydrology {
        tile: TileId,
        iterations: u32,
        remaining_pits: usize,
    },
    /// После всех проходов обновления остались грязные тайлы
    RefreshCapped { passes: u32, dirty_tiles: usize },
}

impl fmt::Display for HydrologyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrologyWarning::UnstableHydrology {
                tile,
                iterations,
                remaining_pits,
            } => write!(
                f,
                "unstable hydrology on tile {tile}: {remaining_pits} pits left after {iterations} fill iterations"
            ),
            HydrologyWarning::RefreshCapped {
                passes,
                dirty_tiles,
            } => write!(
                f,
                "hydrology refresh stopped after {passes} passes with {dirty_tiles} dirty tiles"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HydrologyReport {
    pub updated_tiles: Vec<TileId>,
    pub warnings: Vec<HydrologyWarning>,
}

impl HydrologyReport {
    fn touch(&mut self, tile: TileId) {
        if !self.updated_tiles.contains(&tile) {
            self.updated_tiles.push(tile);
        }
    }

    fn merge(&mut self, other: HydrologyReport) {
        for tile in other.updated_tiles {
            self.touch(tile);
        }
        self.warnings.extend(other.warnings);
    }
}

#[derive(Copy, Clone, PartialEq, PartialOrd)]
struct FloatOrd(f32);

impl Eq for FloatOrd {}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

fn is_edge(x: usize, y: usize, n: usize) -> bool {
    x == 0 || y == 0 || x == n - 1 || y == n - 1
}

/// Цель стока внутри тайла, если она там есть
fn local_target(idx: usize, dir: Dir8, n: usize) -> Option<usize> {
    let (dx, dy) = dir.offset();
    let nx = (idx % n) as i32 + dx;
    let ny = (idx / n) as i32 + dy;
    let n = n as i32;
    (nx >= 0 && ny >= 0 && nx < n && ny < n).then(|| (ny * n + nx) as usize)
}

fn flow_directions(
    surface: &[f32],
    n: usize,
    outside: &impl Fn(i32, i32) -> Option<f32>,
) -> Vec<FlowDir> {
    let mut flow = vec![FlowDir::Sink; n * n];
    for y in 0..n {
        for x in 0..n {
            let idx = y * n + x;
            let here = surface[idx];
            let mut best: Option<(Dir8, f32)> = None;

            for dir in Dir8::ALL {
                let (dx, dy) = dir.offset();
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                let h = if nx >= 0 && ny >= 0 && (nx as usize) < n && (ny as usize) < n {
                    Some(surface[ny as usize * n + nx as usize])
                } else {
                    outside(nx, ny)
                };
                if let Some(h) = h {
                    // строгое `<` сохраняет приоритет направлений при равенстве
                    if h < here && best.is_none_or(|(_, b)| h < b) {
                        best = Some((dir, h));
                    }
                }
            }

            if let Some((dir, _)) = best {
                flow[idx] = FlowDir::To(dir);
            }
        }
    }
    flow
}

fn interior_sinks(flow: &[FlowDir], n: usize) -> usize {
    flow.iter()
        .enumerate()
        .filter(|&(idx, f)| *f == FlowDir::Sink && !is_edge(idx % n, idx / n, n))
        .count()
}

/// Заполнение впадин потоком приоритетов от краёв тайла.
///
/// Каждый не краевой сэмпл получает соседа-«родителя» строго ниже себя, поэтому
/// после прохода внутренних стоков не остаётся.
fn priority_flood(surface: &mut [f32], n: usize, epsilon: f32) {
    let count = n * n;
    let mut visited = vec![false; count];
    let mut heap: BinaryHeap<Reverse<(FloatOrd, usize)>> = BinaryHeap::with_capacity(count);

    for idx in 0..count {
        if is_edge(idx % n, idx / n, n) {
            visited[idx] = true;
            heap.push(Reverse((FloatOrd(surface[idx]), idx)));
        }
    }

    while let Some(Reverse((FloatOrd(current), idx))) = heap.pop() {
        for dir in Dir8::ALL {
            let Some(neighbor) = local_target(idx, dir, n) else {
                continue;
            };
            if visited[neighbor] {
                continue;
            }
            visited[neighbor] = true;
            if surface[neighbor] <= current {
                surface[neighbor] = current + epsilon;
            }
            heap.push(Reverse((FloatOrd(surface[neighbor]), neighbor)));
        }
    }
}

/// Топологический порядок сэмплов по графу стока внутри тайла
fn drainage_order(id: TileId, flow: &[FlowDir], surface: &[f32], n: usize) -> Vec<usize> {
    let count = n * n;
    let mut graph: DiGraph<(), ()> = DiGraph::with_capacity(count, count);
    for _ in 0..count {
        graph.add_node(());
    }
    for (idx, f) in flow.iter().enumerate() {
        if let FlowDir::To(dir) = *f {
            if let Some(target) = local_target(idx, dir, n) {
                graph.add_edge(NodeIndex::new(idx), NodeIndex::new(target), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(|node| node.index()).collect(),
        Err(cycle) => {
            // Недостижимо при строгом спуске; сортируем от вершин к низинам
            tracing::warn!(
                tile = %id,
                node = cycle.node_id().index(),
                "cycle in flow graph, falling back to elevation order"
            );
            let mut order: Vec<usize> = (0..count).collect();
            order.sort_by(|&a, &b| surface[b].total_cmp(&surface[a]));
            order
        }
    }
}

struct TileOutcome {
    warning: Option<HydrologyWarning>,
    changed_receivers: Vec<TileId>,
}

fn recompute_tile(
    store: &mut HeightFieldStore,
    id: TileId,
    settings: &HydrologySettings,
) -> Result<TileOutcome> {
    let n = store.tile_size();
    let grid = store.grid().clone();
    let origin = grid.tile_origin(id);

    let (raw, previous_outflow) = {
        let tile = store.tile_mut(id)?;
        tile.hydrology.status = HydroStatus::Recomputing;
        (
            tile.elevation.data.clone(),
            std::mem::take(&mut tile.hydrology.outflow),
        )
    };

    let view: &HeightFieldStore = store;
    let outside = |x: i32, y: i32| view.drainage_at(SampleCoord::new(origin.x + x, origin.y + y));

    // 1–2. Направления и заполнение впадин
    let mut filled = raw.clone();
    let mut iterations = 0;
    let mut warning = None;
    let flow = loop {
        let flow = flow_directions(&filled, n, &outside);
        let pits = interior_sinks(&flow, n);
        if pits == 0 {
            break flow;
        }
        if iterations >= settings.max_fill_iterations {
            tracing::warn!(
                tile = %id,
                iterations,
                remaining_pits = pits,
                "hydrology did not converge, basins left partially filled"
            );
            warning = Some(HydrologyWarning::UnstableHydrology {
                tile: id,
                iterations,
                remaining_pits: pits,
            });
            break flow;
        }
        priority_flood(&mut filled, n, settings.fill_epsilon);
        iterations += 1;
    };

    // 3. Накопление: притоки из соседних тайлов, затем топологический проход
    let mut accumulation = vec![1.0f32; n * n];
    for (idx, acc) in accumulation.iter_mut().enumerate() {
        let (x, y) = (idx % n, idx / n);
        if !is_edge(x, y, n) {
            continue;
        }
        let here = SampleCoord::new(origin.x + x as i32, origin.y + y as i32);
        for dir in Dir8::ALL {
            let source = here.step(dir);
            if grid.split(source).0 == id {
                continue;
            }
            if view.flow_at(source) == Some(FlowDir::To(dir.opposite())) {
                *acc += view.accumulation_at(source).unwrap_or(0.0);
            }
        }
    }
    for idx in drainage_order(id, &flow, &filled, n) {
        if let FlowDir::To(dir) = flow[idx] {
            if let Some(target) = local_target(idx, dir, n) {
                accumulation[target] += accumulation[idx];
            }
        }
    }

    // 4. Сток в соседние тайлы
    let mut outflow: BTreeMap<TileId, Vec<(u32, f32)>> = BTreeMap::new();
    for (idx, f) in flow.iter().enumerate() {
        let FlowDir::To(dir) = *f else { continue };
        if local_target(idx, dir, n).is_some() {
            continue;
        }
        let source = SampleCoord::new(origin.x + (idx % n) as i32, origin.y + (idx / n) as i32);
        let (receiver, _) = grid.split(source.step(dir));
        if view.contains(receiver) {
            outflow
                .entry(receiver)
                .or_default()
                .push((idx as u32, accumulation[idx]));
        }
    }
    let receivers: BTreeSet<TileId> = outflow
        .keys()
        .chain(previous_outflow.keys())
        .copied()
        .collect();
    let changed_receivers = receivers
        .into_iter()
        .filter(|r| outflow.get(r) != previous_outflow.get(r))
        .collect();

    let lake = filled
        .iter()
        .zip(&raw)
        .map(|(f, r)| f - r > settings.lake_min_depth)
        .collect();

    let tile = store.tile_mut(id)?;
    tile.hydrology = HydrologyState {
        status: HydroStatus::Clean,
        flow,
        accumulation,
        filled,
        lake,
        outflow,
    };

    Ok(TileOutcome {
        warning,
        changed_receivers,
    })
}

/// Пересчитывает гидрологию тайла и, при необходимости, тайлов ниже по течению
pub fn recompute(
    store: &mut HeightFieldStore,
    id: TileId,
    propagate_downstream: bool,
    settings: &HydrologySettings,
) -> Result<HydrologyReport> {
    if !store.contains(id) {
        return Err(MapError::TileNotFound(id));
    }
    let depth_bound = settings
        .propagation_depth
        .unwrap_or_else(|| store.grid().max_ring())
        .max(1);

    let mut report = HydrologyReport::default();
    let mut queue = VecDeque::from([(id, 0u32)]);
    let mut queued = BTreeSet::from([id]);

    while let Some((tile, depth)) = queue.pop_front() {
        queued.remove(&tile);
        let outcome = recompute_tile(store, tile, settings)?;
        report.touch(tile);
        report.warnings.extend(outcome.warning);

        for receiver in outcome.changed_receivers {
            store.mark_dirty(receiver)?;
            if !propagate_downstream {
                continue;
            }
            if depth + 1 > depth_bound {
                tracing::debug!(
                    tile = %receiver,
                    depth = depth + 1,
                    "propagation depth reached, tile left dirty"
                );
                continue;
            }
            if queued.insert(receiver) {
                queue.push_back((receiver, depth + 1));
            }
        }
    }

    tracing::debug!(
        tile = %id,
        updated = report.updated_tiles.len(),
        propagate_downstream,
        "hydrology recomputed"
    );
    Ok(report)
}

/// Пересчитывает все грязные тайлы, начиная с самых высоких
pub fn refresh(store: &mut HeightFieldStore, settings: &HydrologySettings) -> Result<HydrologyReport> {
    let mut report = HydrologyReport::default();

    for _ in 0..settings.refresh_pass_cap {
        let mut dirty: Vec<(TileId, f32)> = store
            .dirty_tiles()
            .into_iter()
            .map(|id| store.tile(id).map(|t| (id, t.elevation.mean())))
            .collect::<Result<_>>()?;
        if dirty.is_empty() {
            return Ok(report);
        }
        dirty.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        for (id, _) in dirty {
            if store.is_dirty(id) {
                report.merge(recompute(store, id, true, settings)?);
            }
        }
    }

    let remaining = store.dirty_tiles().len();
    if remaining > 0 {
        tracing::warn!(
            passes = settings.refresh_pass_cap,
            dirty_tiles = remaining,
            "hydrology refresh hit its pass cap"
        );
        report.warnings.push(HydrologyWarning::RefreshCapped {
            passes: settings.refresh_pass_cap,
            dirty_tiles: remaining,
        });
    }
    Ok(report)
}
