/* Copyright (C) 2022 Antmicro
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

pub type Delay = i32;

/* Element ids follow the himbaechel scheme: a tile index plus an index into the
 * tile type's bel/wire/pip list. */

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct BelId {
    pub tile: u32,
    pub index: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct WireId {
    pub tile: u32,
    pub index: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct PipId {
    pub tile: u32,
    pub index: u32,
}

impl BelId {
    pub fn new(tile: u32, index: u32) -> Self {
        Self { tile, index }
    }
}

impl WireId {
    pub fn new(tile: u32, index: u32) -> Self {
        Self { tile, index }
    }
}

impl PipId {
    pub fn new(tile: u32, index: u32) -> Self {
        Self { tile, index }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Loc {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Loc {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn manhattan(&self, other: &Loc) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Inclusive, axis-aligned box in tile coordinates.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BoundingBox {
    pub fn around(x: i32, y: i32) -> Self {
        Self { x0: x, y0: y, x1: x, y1: y }
    }

    pub fn extend(&mut self, x: i32, y: i32) {
        self.x0 = self.x0.min(x);
        self.y0 = self.y0.min(y);
        self.x1 = self.x1.max(x);
        self.y1 = self.y1.max(y);
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}
