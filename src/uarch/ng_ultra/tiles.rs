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

use crate::chipdb::{Device, TileExtra};
use crate::strings::IdString;

/// Names and lobes of every tile, computed once from the database.
#[derive(Default)]
pub struct TileTable {
    names: Vec<String>,
    name_ids: Vec<IdString>,
    lobes: Vec<Option<u32>>,
}

impl TileTable {
    pub fn new(dev: &Device) -> Self {
        let mut table = Self::default();
        for tile in 0 .. dev.tile_count() {
            let inst = dev.tile_inst(tile);
            let prefix = match &inst.extra {
                Some(extra) => extra.name.clone(),
                None => {
                    let (x, y) = dev.tile_xy(tile);
                    format!("X{}Y{}", x, y)
                },
            };
            let name = format!("{}:{}", prefix, dev.tile_type(tile).name);
            table.name_ids.push(IdString::new(&name));
            table.names.push(name);
            table.lobes.push(inst.extra.as_ref().and_then(|e| e.lobe));
        }
        table
    }

    pub fn lobe(&self, tile: u32) -> Option<u32> {
        self.lobes.get(tile as usize).copied().flatten()
    }

    pub fn name(&self, tile: u32) -> &str {
        self.names.get(tile as usize).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn name_id(&self, tile: u32) -> IdString {
        self.name_ids.get(tile as usize).copied().unwrap_or(IdString::EMPTY)
    }

    /// The I/O bank a tile belongs to: its name without the tile type suffix.
    pub fn bank(&self, tile: u32) -> &str {
        strip_tile_type(self.name(tile))
    }
}

pub fn strip_tile_type(name: &str) -> &str {
    match name.rfind(':') {
        Some(pos) => &name[.. pos],
        None => name,
    }
}

pub fn tile_extra_data(dev: &Device, tile: u32) -> Option<&TileExtra> {
    if tile >= dev.tile_count() {
        return None;
    }
    dev.tile_inst(tile).extra.as_ref()
}
