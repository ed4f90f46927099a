// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Storage of triangulated 3D landmarks, owned by the map,
//! outside of any frame.
//!
//! Observations refer to landmarks through plain index handles instead
//! of back-pointers, so frames and the map never form an ownership
//! cycle. The pose solver only ever reads landmark positions.

use crate::misc::type_aliases::Point3;

/// Non-owning handle to a landmark inside a [`LandmarkStore`].
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct LandmarkId(usize);

/// Owns the 3D positions of the triangulated landmarks of the map.
#[derive(Debug, Clone, Default)]
pub struct LandmarkStore {
    positions: Vec<Point3>,
}

impl LandmarkStore {
    /// Create an empty landmark store.
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
        }
    }

    /// Add a landmark position and return its handle.
    pub fn add(&mut self, position: Point3) -> LandmarkId {
        self.positions.push(position);
        LandmarkId(self.positions.len() - 1)
    }

    /// Position of a landmark, or `None` for a dangling handle
    /// (e.g. a handle from another store).
    pub fn position(&self, id: LandmarkId) -> Option<Point3> {
        self.positions.get(id.0).copied()
    }

    /// Number of landmarks in the store.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True if the store contains no landmark.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// TESTS #############################################################
