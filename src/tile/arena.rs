//! Per-survey tile registry.
//!
//! The arena owns the quadtree as a flat map from `(order, pixel)` to
//! reference-counted tiles, avoiding the parent/child/ancestor ownership
//! cycles a pointer-linked tree would create: children and ancestors hold
//! `Arc`/`Weak` handles, and a tile dies when eviction has removed it from
//! both its parent's children array and this map.
//!
//! Tiles are created lazily, depth-first, as the view requires resolution:
//! [`TileArena::get_or_create`] for self-owned (fetchable) tiles,
//! [`TileArena::children`] for derived ones.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::key::TileKey;
use super::node::Tile;

/// Resolution order of the base ("allSky") plane that is never evicted.
pub const BASE_ORDER: u8 = 3;

/// Registry of one survey's instantiated tiles.
pub struct TileArena {
    survey: Arc<str>,
    tiles: RwLock<HashMap<(u8, u64), Arc<Tile>>>,
}

impl TileArena {
    /// Create an empty arena for `survey`.
    pub fn new(survey: impl Into<Arc<str>>) -> Self {
        Self {
            survey: survey.into(),
            tiles: RwLock::new(HashMap::new()),
        }
    }

    /// The survey identifier tiles of this arena belong to.
    pub fn survey(&self) -> &str {
        &self.survey
    }

    /// Number of instantiated tiles.
    pub fn len(&self) -> usize {
        self.tiles.read().len()
    }

    /// True when no tiles are instantiated.
    pub fn is_empty(&self) -> bool {
        self.tiles.read().is_empty()
    }

    /// Look up an instantiated tile.
    pub fn get(&self, order: u8, pixel: u64) -> Option<Arc<Tile>> {
        self.tiles.read().get(&(order, pixel)).cloned()
    }

    /// Get or lazily create a self-owned tile at `(order, pixel)`.
    ///
    /// Tiles at [`BASE_ORDER`] are marked as the base plane and excluded
    /// from eviction.
    pub fn get_or_create(&self, order: u8, pixel: u64) -> Arc<Tile> {
        if let Some(tile) = self.get(order, pixel) {
            return tile;
        }
        let mut tiles = self.tiles.write();
        tiles
            .entry((order, pixel))
            .or_insert_with(|| {
                let key = TileKey::new(self.survey.clone(), order, pixel);
                Tile::new_root(key, order == BASE_ORDER)
            })
            .clone()
    }

    /// Get or lazily create the 4 children of `parent`, NESTED order 0..3.
    ///
    /// Children are derived: READY on creation, `depth = parent.depth + 1`,
    /// ancestor set to `parent` itself when it is self-owned and propagated
    /// from `parent`'s ancestor otherwise - so the ancestor handle always
    /// points at the nearest tile that fetches its own pixels.
    pub fn children(&self, parent: &Arc<Tile>) -> [Arc<Tile>; 4] {
        if let Some(children) = parent.children() {
            return children;
        }

        let ancestor = if parent.is_derived() {
            parent.ancestor()
        } else {
            Some(parent.clone())
        };

        let mut slot = parent.children_slot().lock();
        if let Some(children) = slot.as_ref() {
            return children.clone();
        }

        let mut tiles = self.tiles.write();
        let children: [Arc<Tile>; 4] = std::array::from_fn(|i| {
            let key = parent.key().child(i as u8);
            tiles
                .entry((key.order, key.pixel))
                .or_insert_with(|| match &ancestor {
                    Some(anc) => {
                        let depth = key.order - anc.key().order;
                        Tile::new_derived(key, anc, depth)
                    }
                    // Ancestor already reclaimed: the child becomes a
                    // self-owned tile and must be fetched like any other.
                    None => Tile::new_root(key, false),
                })
                .clone()
        });

        *slot = Some(children.clone());
        children
    }

    /// Remove a tile from the registry. The tile itself dies once its
    /// parent's children array is also cleared (eviction's purge pass).
    pub fn remove(&self, key: &TileKey) {
        self.tiles.write().remove(&(key.order, key.pixel));
    }

    /// Snapshot of every instantiated tile, for the eviction sweep.
    pub fn snapshot(&self) -> Vec<Arc<Tile>> {
        self.tiles.read().values().cloned().collect()
    }

    /// Snapshot of the quadtree roots: tiles whose parent is not
    /// instantiated. The purge pass recurses from these.
    pub fn roots(&self) -> Vec<Arc<Tile>> {
        let tiles = self.tiles.read();
        tiles
            .values()
            .filter(|t| match t.key().parent() {
                Some(parent) => !tiles.contains_key(&(parent.order, parent.pixel)),
                None => true,
            })
            .cloned()
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
