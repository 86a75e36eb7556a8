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

//! Small in-memory chip databases for unit tests.

use crate::strings::IdString;
use super::*;

pub struct ChipBuilder {
    db: ChipDb,
}

impl ChipBuilder {
    /// An empty `width`x`height` grid. Every tile starts with the bel-less `NULL` type.
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        let null = TileTypeData {
            name: IdString::new("NULL"),
            bels: Vec::new(),
            wires: Vec::new(),
            pips: Vec::new(),
            mux_groups: Vec::new(),
        };
        Self {
            db: ChipDb {
                name: name.to_string(),
                width,
                height,
                tile_types: vec![null],
                tiles: (0 .. width * height)
                    .map(|_| TileInstData { type_idx: 0, extra: None })
                    .collect(),
                nodes: Vec::new(),
                extra: ChipExtra::default(),
            },
        }
    }

    pub fn tile_type(&mut self, name: &str) -> u32 {
        self.db.tile_types.push(TileTypeData {
            name: IdString::new(name),
            bels: Vec::new(),
            wires: Vec::new(),
            pips: Vec::new(),
            mux_groups: Vec::new(),
        });
        self.db.tile_types.len() as u32 - 1
    }

    /// Index of wire `name` in tile type `tt`, creating a plain wire if it doesn't exist.
    pub fn wire(&mut self, tt: u32, name: &str) -> u32 {
        self.wire_with(tt, name, "", 0)
    }

    pub fn wire_with(&mut self, tt: u32, name: &str, wire_type: &str, flags: u32) -> u32 {
        let id = IdString::new(name);
        let wires = &mut self.db.tile_types[tt as usize].wires;
        if let Some(idx) = wires.iter().position(|w| w.name == id) {
            if flags != 0 {
                wires[idx].flags |= flags;
            }
            if !wire_type.is_empty() {
                wires[idx].wire_type = IdString::new(wire_type);
            }
            return idx as u32;
        }
        wires.push(TileWireData {
            name: id,
            wire_type: IdString::new(wire_type),
            flags,
        });
        wires.len() as u32 - 1
    }

    /// Adds a bel. Pins are `(pin, wire, dir)`, wires are created on demand.
    pub fn bel(&mut self, tt: u32, name: &str, bel_type: &str, z: i32, pins: &[(&str, &str, PinDir)])
        -> u32
    {
        let pins: Vec<_> = pins.iter()
            .map(|(pin, wire, dir)| BelPin {
                name: IdString::new(pin),
                wire: self.wire(tt, wire),
                dir: *dir,
            })
            .collect();
        let bels = &mut self.db.tile_types[tt as usize].bels;
        bels.push(BelData {
            name: IdString::new(name),
            bel_type: IdString::new(bel_type),
            z,
            flags: 0,
            pins,
            extra: None,
        });
        bels.len() as u32 - 1
    }

    pub fn bel_flags(&mut self, tt: u32, bel: u32, flags: u32) {
        self.db.tile_types[tt as usize].bels[bel as usize].flags |= flags;
    }

    pub fn gck_sources(&mut self, tt: u32, bel: u32, sources: GckSources) {
        let data = &mut self.db.tile_types[tt as usize].bels[bel as usize];
        data.extra.get_or_insert_with(BelExtra::default).gck_sources = Some(sources);
    }

    pub fn pip(&mut self, tt: u32, src: &str, dst: &str) -> u32 {
        self.pip_with(tt, src, dst, None)
    }

    pub fn pip_with(&mut self, tt: u32, src: &str, dst: &str, extra: Option<PipExtra>) -> u32 {
        let src_wire = self.wire(tt, src);
        let dst_wire = self.wire(tt, dst);
        let pips = &mut self.db.tile_types[tt as usize].pips;
        pips.push(PipData { src_wire, dst_wire, flags: 0, extra });
        pips.len() as u32 - 1
    }

    pub fn mux_group(&mut self, tt: u32, bels: &[u32], ports: &[&str]) {
        let ttd = &mut self.db.tile_types[tt as usize];
        let group = ttd.mux_groups.len() as u32;
        ttd.mux_groups.push(MuxGroup {
            bels: bels.to_vec(),
            ports: ports.iter().map(|p| IdString::new(p)).collect(),
        });
        for bel in bels {
            ttd.bels[*bel as usize].extra.get_or_insert_with(BelExtra::default).mux_group =
                Some(group);
        }
    }

    pub fn place(&mut self, x: u32, y: u32, tt: u32, name: Option<&str>, lobe: Option<u32>) {
        let inst = &mut self.db.tiles[(y * self.db.width + x) as usize];
        inst.type_idx = tt;
        inst.extra = name.map(|name| TileExtra { name: name.to_string(), lobe });
    }

    /// Joins tile wires `(x, y, wire name)` into one node. The first one is canonical.
    pub fn node(&mut self, wires: &[(u32, u32, &str)]) {
        let node = wires.iter()
            .map(|(x, y, name)| {
                let tile = y * self.db.width + x;
                let tt = self.db.tiles[tile as usize].type_idx;
                NodeWireRef { tile, index: self.wire(tt, name) }
            })
            .collect();
        self.db.nodes.push(node);
    }

    pub fn bank_ckg(&mut self, bank: &str, source_tile: &str, ckg_tile: &str) {
        self.db.extra.bank_ckg.push(BankCkg {
            bank: IdString::new(bank),
            source_tile: IdString::new(source_tile),
            ckg_tile: IdString::new(ckg_tile),
        });
    }

    pub fn finish(self) -> ChipDb {
        self.db
    }

    pub fn build(self) -> Device {
        Device::new(self.db).expect("test chip database is inconsistent")
    }
}
