//! A* search over the tile neighbor graph.

use crate::board::{HexBoard, TileId, VERTICAL_SPACING};
use ordered_float::OrderedFloat;
use slotmap::SecondaryMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::warn;

/// Uniform cost of moving between adjacent tiles.
pub const HOP_COST: f32 = VERTICAL_SPACING;

/// Admissible heuristic: straight-line distance to the goal, never below
/// one hop so it stays comparable to the per-edge cost.
#[inline]
fn heuristic(from: crate::Position, goal: crate::Position) -> f32 {
    from.distance(goal).max(HOP_COST)
}

/// A* from `start` to `goal`, returning the inclusive tile sequence.
///
/// Ties on the open set are broken by discovery order. Returns `None` when
/// the open set empties without reaching the goal; on a correctly built
/// board that means the neighbor graph is disconnected, which is a
/// construction defect rather than a runtime condition, so it is logged
/// and left to the caller to skip.
#[must_use]
pub fn find_path(board: &HexBoard, start: TileId, goal: TileId) -> Option<Vec<TileId>> {
    let start_pos = board.tile(start)?.position;
    let goal_pos = board.tile(goal)?.position;
    if start == goal {
        return Some(vec![start]);
    }

    let mut g_score: SecondaryMap<TileId, f32> = SecondaryMap::new();
    let mut came_from: SecondaryMap<TileId, TileId> = SecondaryMap::new();
    let mut open: BinaryHeap<Reverse<(OrderedFloat<f32>, u64, TileId)>> = BinaryHeap::new();
    let mut discovered: u64 = 0;

    g_score.insert(start, 0.0);
    open.push(Reverse((
        OrderedFloat(heuristic(start_pos, goal_pos)),
        discovered,
        start,
    )));

    while let Some(Reverse((_, _, current))) = open.pop() {
        if current == goal {
            return Some(reconstruct(&came_from, start, goal));
        }
        let current_g = match g_score.get(current) {
            Some(&g) => g,
            None => continue,
        };
        for &neighbor in board.neighbors(current) {
            let tentative = current_g + HOP_COST;
            let improves = g_score.get(neighbor).is_none_or(|&old| tentative < old);
            if !improves {
                continue;
            }
            let neighbor_pos = match board.tile(neighbor) {
                Some(tile) => tile.position,
                None => continue,
            };
            g_score.insert(neighbor, tentative);
            came_from.insert(neighbor, current);
            discovered += 1;
            open.push(Reverse((
                OrderedFloat(tentative + heuristic(neighbor_pos, goal_pos)),
                discovered,
                neighbor,
            )));
        }
    }

    warn!(
        ?start,
        ?goal,
        "path search exhausted the open set; the neighbor graph is disconnected"
    );
    None
}

fn reconstruct(came_from: &SecondaryMap<TileId, TileId>, start: TileId, goal: TileId) -> Vec<TileId> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(current) {
            Some(&prev) => {
                path.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}
