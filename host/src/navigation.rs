//! Grid navigation: walkability mask, A* path search and path following.

use shared::{Level, Vector2};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Step costs in thousandths of a cell so the open list can use integer keys.
const STRAIGHT_COST: u32 = 1000;
const DIAGONAL_COST: u32 = 1414;

const NEIGHBOURS: [(i64, i64); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Walkability mask rasterized from a level's static colliders.
#[derive(Debug, Clone)]
pub struct NavGrid {
    cols: usize,
    rows: usize,
    scale: f32,
    walkable: Vec<bool>,
}

impl NavGrid {
    pub fn from_level(level: &Level, scale: f32) -> Self {
        let cols = (level.width / scale).ceil() as usize + 1;
        let rows = (level.height / scale).ceil() as usize + 1;
        let mut grid = Self {
            cols,
            rows,
            scale,
            walkable: vec![true; cols * rows],
        };
        for collider in level.colliders.iter().filter(|c| !c.inverted) {
            let x0 = (collider.min.x / scale).floor().max(0.0) as usize;
            let y0 = (collider.min.y / scale).floor().max(0.0) as usize;
            let x1 = ((collider.max.x / scale).ceil().max(0.0) as usize).min(cols);
            let y1 = ((collider.max.y / scale).ceil().max(0.0) as usize).min(rows);
            for y in y0..y1 {
                for x in x0..x1 {
                    grid.walkable[y * cols + x] = false;
                }
            }
        }
        grid
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn cell_of(&self, world: Vector2) -> (i64, i64) {
        (
            (world.x / self.scale).round() as i64,
            (world.y / self.scale).round() as i64,
        )
    }

    fn index(&self, cell: (i64, i64)) -> Option<usize> {
        let (x, y) = cell;
        if x < 0 || y < 0 || x as usize >= self.cols || y as usize >= self.rows {
            return None;
        }
        Some(y as usize * self.cols + x as usize)
    }

    fn cell_at(&self, index: usize) -> (i64, i64) {
        ((index % self.cols) as i64, (index / self.cols) as i64)
    }

    fn walkable_cell(&self, cell: (i64, i64)) -> bool {
        self.index(cell).is_some_and(|i| self.walkable[i])
    }

    /// Whether the cell nearest to `world` can be entered.
    pub fn is_walkable(&self, world: Vector2) -> bool {
        self.walkable_cell(self.cell_of(world))
    }

    /// Marks one cell blocked; used to carve test mazes.
    pub fn block(&mut self, world: Vector2) {
        if let Some(i) = self.index(self.cell_of(world)) {
            self.walkable[i] = false;
        }
    }

    fn heuristic(&self, from: usize, to: usize) -> u32 {
        let (ax, ay) = self.cell_at(from);
        let (bx, by) = self.cell_at(to);
        let dx = (ax - bx) as f32;
        let dy = (ay - by) as f32;
        // floor keeps the estimate admissible
        ((dx * dx + dy * dy).sqrt() * STRAIGHT_COST as f32).floor() as u32
    }

    /// A* over the grid. Returns waypoints in world space, start cell excluded.
    ///
    /// Ties on f-cost go to the node opened first. Diagonal steps may not cut
    /// past a blocked orthogonal neighbour.
    pub fn find_path(&self, start: Vector2, goal: Vector2) -> Vec<Vector2> {
        let (Some(start), Some(goal)) = (
            self.index(self.cell_of(start)),
            self.index(self.cell_of(goal)),
        ) else {
            return Vec::new();
        };
        if !self.walkable[start] || !self.walkable[goal] || start == goal {
            return Vec::new();
        }

        let mut g_cost = vec![u32::MAX; self.walkable.len()];
        let mut came_from: Vec<Option<usize>> = vec![None; self.walkable.len()];
        let mut closed = vec![false; self.walkable.len()];
        let mut open: BinaryHeap<Reverse<(u32, u64, usize)>> = BinaryHeap::new();
        let mut opened: u64 = 0;

        g_cost[start] = 0;
        open.push(Reverse((self.heuristic(start, goal), opened, start)));

        while let Some(Reverse((_, _, current))) = open.pop() {
            if current == goal {
                return self.reconstruct(&came_from, goal);
            }
            if closed[current] {
                continue;
            }
            closed[current] = true;

            let (cx, cy) = self.cell_at(current);
            for (dx, dy) in NEIGHBOURS {
                let next_cell = (cx + dx, cy + dy);
                let Some(next) = self.index(next_cell) else {
                    continue;
                };
                if !self.walkable[next] || closed[next] {
                    continue;
                }
                let diagonal = dx != 0 && dy != 0;
                if diagonal
                    && (!self.walkable_cell((cx + dx, cy)) || !self.walkable_cell((cx, cy + dy)))
                {
                    continue;
                }
                let step = if diagonal { DIAGONAL_COST } else { STRAIGHT_COST };
                let tentative = g_cost[current].saturating_add(step);
                if tentative < g_cost[next] {
                    g_cost[next] = tentative;
                    came_from[next] = Some(current);
                    opened += 1;
                    let f = tentative.saturating_add(self.heuristic(next, goal));
                    open.push(Reverse((f, opened, next)));
                }
            }
        }
        Vec::new()
    }

    fn reconstruct(&self, came_from: &[Option<usize>], goal: usize) -> Vec<Vector2> {
        let mut cells = vec![goal];
        let mut cursor = goal;
        while let Some(previous) = came_from[cursor] {
            cells.push(previous);
            cursor = previous;
        }
        cells.reverse();
        cells
            .into_iter()
            .skip(1)
            .map(|index| {
                let (x, y) = self.cell_at(index);
                Vector2::new(x as f32 * self.scale, y as f32 * self.scale)
            })
            .collect()
    }
}

/// Path queries for a level, empty when the level ships no navigation mesh.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    grid: Option<NavGrid>,
}

impl PathPlanner {
    pub fn from_level(level: &Level, scale: f32) -> Self {
        Self {
            grid: level.has_nav_mesh.then(|| NavGrid::from_level(level, scale)),
        }
    }

    pub fn without_mesh() -> Self {
        Self { grid: None }
    }

    pub fn grid(&self) -> Option<&NavGrid> {
        self.grid.as_ref()
    }

    pub fn find_path(&self, start: Vector2, goal: Vector2) -> Vec<Vector2> {
        match &self.grid {
            Some(grid) => grid.find_path(start, goal),
            None => Vec::new(),
        }
    }

    /// Everywhere is walkable without a mesh.
    pub fn is_walkable(&self, world: Vector2) -> bool {
        self.grid.as_ref().map_or(true, |grid| grid.is_walkable(world))
    }

    pub fn scale(&self) -> Option<f32> {
        self.grid.as_ref().map(NavGrid::scale)
    }
}

/// Consumes a planned path and throttles replanning.
#[derive(Debug, Clone, Default)]
pub struct PathFollower {
    path: VecDeque<Vector2>,
    last_target: Option<Vector2>,
}

impl PathFollower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> usize {
        self.path.len()
    }

    /// Returns the direction to steer in this tick.
    ///
    /// The head waypoint is popped once within half a cell. A new path is
    /// only requested on a replan tick or when the path ran out, and only if
    /// the target moved since the last request.
    pub fn steer(
        &mut self,
        planner: &PathPlanner,
        pos: Vector2,
        target: Vector2,
        replan_due: bool,
    ) -> Vector2 {
        if let (Some(head), Some(scale)) = (self.path.front(), planner.scale()) {
            let reach = scale / 2.0;
            if head.sq_dist(&pos) <= reach * reach {
                self.path.pop_front();
            }
        }

        if (replan_due || self.path.is_empty()) && self.last_target != Some(target) {
            self.path = planner.find_path(pos, target).into();
        }
        self.last_target = Some(target);

        match self.path.front() {
            Some(waypoint) => *waypoint - pos,
            None => target - pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Collider;

    fn open_level(size: f32) -> Level {
        Level {
            width: size,
            height: size,
            castle_positions: Vec::new(),
            colliders: Vec::new(),
            neutrals: Vec::new(),
            has_nav_mesh: true,
        }
    }

    fn path_length(start: Vector2, path: &[Vector2]) -> f32 {
        let mut length = 0.0;
        let mut previous = start;
        for point in path {
            length += previous.dist(point);
            previous = *point;
        }
        length
    }

    #[test]
    fn test_straight_path_on_empty_grid() {
        let grid = NavGrid::from_level(&open_level(320.0), 32.0);
        let path = grid.find_path(Vector2::new(0.0, 0.0), Vector2::new(128.0, 0.0));
        assert_eq!(
            path,
            vec![
                Vector2::new(32.0, 0.0),
                Vector2::new(64.0, 0.0),
                Vector2::new(96.0, 0.0),
                Vector2::new(128.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_path_length_within_octile_bound() {
        let grid = NavGrid::from_level(&open_level(640.0), 32.0);
        let start = Vector2::new(32.0, 64.0);
        let goal = Vector2::new(512.0, 320.0);
        let path = grid.find_path(start, goal);

        assert_eq!(path.last(), Some(&goal));
        let straight = start.dist(&goal);
        let length = path_length(start, &path);
        assert!(length >= straight - 0.01);
        // octile paths are at most ~8.3% longer than the euclidean line
        assert!(length <= straight * 1.0824 + 0.01, "{} vs {}", length, straight);
    }

    #[test]
    fn test_routes_around_wall() {
        let mut level = open_level(320.0);
        level.colliders.push(Collider {
            min: Vector2::new(128.0, 0.0),
            max: Vector2::new(160.0, 256.0),
            inverted: false,
        });
        let grid = NavGrid::from_level(&level, 32.0);
        assert!(!grid.is_walkable(Vector2::new(128.0, 64.0)));

        let path = grid.find_path(Vector2::new(32.0, 32.0), Vector2::new(256.0, 32.0));
        assert!(!path.is_empty());
        assert!(path.iter().all(|p| grid.is_walkable(*p)));
        assert!(path.iter().any(|p| p.y >= 256.0));
    }

    #[test]
    fn test_no_path_when_walled_off() {
        let mut level = open_level(320.0);
        level.colliders.push(Collider {
            min: Vector2::new(128.0, 0.0),
            max: Vector2::new(160.0, 400.0),
            inverted: false,
        });
        let grid = NavGrid::from_level(&level, 32.0);
        assert!(grid
            .find_path(Vector2::new(32.0, 32.0), Vector2::new(256.0, 32.0))
            .is_empty());
    }

    #[test]
    fn test_inverted_boundary_is_ignored() {
        let mut level = open_level(320.0);
        level.colliders.push(Collider {
            min: Vector2::ZERO,
            max: Vector2::new(320.0, 320.0),
            inverted: true,
        });
        let grid = NavGrid::from_level(&level, 32.0);
        assert!(grid.is_walkable(Vector2::new(160.0, 160.0)));
    }

    #[test]
    fn test_planner_without_mesh_returns_nothing() {
        let mut level = open_level(320.0);
        level.has_nav_mesh = false;
        let planner = PathPlanner::from_level(&level, 32.0);
        assert!(planner
            .find_path(Vector2::ZERO, Vector2::new(100.0, 100.0))
            .is_empty());
        assert!(planner.is_walkable(Vector2::new(-50.0, 0.0)));
    }

    #[test]
    fn test_same_cell_is_empty_path() {
        let grid = NavGrid::from_level(&open_level(320.0), 32.0);
        assert!(grid
            .find_path(Vector2::new(33.0, 33.0), Vector2::new(40.0, 30.0))
            .is_empty());
    }

    #[test]
    fn test_follower_pops_reached_waypoint() {
        let planner = PathPlanner::from_level(&open_level(320.0), 32.0);
        let mut follower = PathFollower::new();
        let target = Vector2::new(128.0, 0.0);

        let dir = follower.steer(&planner, Vector2::ZERO, target, true);
        assert_eq!(follower.remaining(), 4);
        assert_eq!(dir, Vector2::new(32.0, 0.0));

        // within half a cell of the head waypoint
        let dir = follower.steer(&planner, Vector2::new(20.0, 0.0), target, false);
        assert_eq!(follower.remaining(), 3);
        assert_eq!(dir, Vector2::new(44.0, 0.0));
    }

    #[test]
    fn test_follower_skips_replan_for_same_target() {
        let mut level = open_level(320.0);
        let planner = PathPlanner::from_level(&level, 32.0);
        let mut follower = PathFollower::new();
        let target = Vector2::new(128.0, 0.0);
        follower.steer(&planner, Vector2::ZERO, target, true);

        // a different planner would produce a different path, but the target did not move
        level.has_nav_mesh = false;
        let empty = PathPlanner::from_level(&level, 32.0);
        follower.steer(&empty, Vector2::ZERO, target, true);
        assert_eq!(follower.remaining(), 4);
    }
}
