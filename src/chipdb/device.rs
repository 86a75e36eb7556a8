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

use std::collections::HashMap;

use crate::common::*;
use crate::error::DbError;
use crate::strings::IdString;
use super::*;

/// Read-only view of a chip database with the lookups the architecture core needs.
/// Wires are always reported in their canonical (node head) form.
pub struct Device {
    db: ChipDb,
    canonical: HashMap<WireId, WireId>,
    node_members: HashMap<WireId, Vec<WireId>>,
    downhill: HashMap<WireId, Vec<PipId>>,
    uphill: HashMap<WireId, Vec<PipId>>,
    wire_bel_pins: HashMap<WireId, Vec<(BelId, IdString)>>,
    bel_by_loc: HashMap<Loc, BelId>,
}

/// `width * height` must not overflow and must match the tile list.
pub(crate) fn check_grid(db: &ChipDb) -> Result<(), DbError> {
    let tiles = db.width.checked_mul(db.height).ok_or_else(|| DbError::Inconsistent(format!(
        "{}x{} grid is too large", db.width, db.height
    )))?;
    if db.tiles.len() != tiles as usize {
        return Err(DbError::Inconsistent(format!(
            "{} tiles for a {}x{} grid", db.tiles.len(), db.width, db.height
        )));
    }
    Ok(())
}

/// Tile-local indexes: pip wires, bel pin wires, mux group members and pip bels.
fn check_tile_type(tt: &TileTypeData) -> Result<(), DbError> {
    let (nbels, nwires) = (tt.bels.len(), tt.wires.len());
    let bad = |what: String| -> Result<(), DbError> {
        Err(DbError::Inconsistent(format!("tile type {}: {}", tt.name, what)))
    };

    for (pip_idx, pip) in tt.pips.iter().enumerate() {
        if pip.src_wire as usize >= nwires || pip.dst_wire as usize >= nwires {
            return bad(format!("pip {} references a missing wire", pip_idx));
        }
        if let Some(bel) = pip.extra.as_ref().and_then(|e| e.bel) {
            if bel as usize >= nbels {
                return bad(format!("pip {} routes through missing bel {}", pip_idx, bel));
            }
        }
    }
    for bel in &tt.bels {
        if let Some(pin) = bel.pins.iter().find(|p| p.wire as usize >= nwires) {
            return bad(format!("pin {}.{} references missing wire {}", bel.name, pin.name, pin.wire));
        }
    }
    for (group_idx, group) in tt.mux_groups.iter().enumerate() {
        if let Some(bel) = group.bels.iter().find(|b| **b as usize >= nbels) {
            return bad(format!("mux group {} references missing bel {}", group_idx, bel));
        }
    }
    Ok(())
}

impl Device {
    pub fn new(db: ChipDb) -> Result<Self, DbError> {
        check_grid(&db)?;
        for (tile, inst) in db.tiles.iter().enumerate() {
            if inst.type_idx as usize >= db.tile_types.len() {
                return Err(DbError::Inconsistent(format!(
                    "tile {} has unknown type {}", tile, inst.type_idx
                )));
            }
        }
        for tt in &db.tile_types {
            check_tile_type(tt)?;
        }

        let mut canonical = HashMap::new();
        let mut node_members = HashMap::new();
        for node in &db.nodes {
            let head = match node.first() {
                Some(head) => WireId::new(head.tile, head.index),
                None => continue,
            };
            let members: Vec<_> = node.iter()
                .map(|w| WireId::new(w.tile, w.index))
                .collect();
            for m in &members {
                let wires = db.tiles.get(m.tile as usize)
                    .map(|inst| db.tile_types[inst.type_idx as usize].wires.len());
                if wires.map_or(true, |n| m.index as usize >= n) {
                    return Err(DbError::Inconsistent(format!(
                        "node member {}/{} does not exist", m.tile, m.index
                    )));
                }
                if canonical.insert(*m, head).is_some() {
                    return Err(DbError::Inconsistent(format!(
                        "tile wire {}/{} is part of two nodes", m.tile, m.index
                    )));
                }
            }
            node_members.insert(head, members);
        }

        let mut me = Self {
            db,
            canonical,
            node_members,
            downhill: HashMap::new(),
            uphill: HashMap::new(),
            wire_bel_pins: HashMap::new(),
            bel_by_loc: HashMap::new(),
        };
        me.build_lookups()?;
        Ok(me)
    }

    fn build_lookups(&mut self) -> Result<(), DbError> {
        let mut downhill: HashMap<WireId, Vec<PipId>> = HashMap::new();
        let mut uphill: HashMap<WireId, Vec<PipId>> = HashMap::new();
        let mut wire_bel_pins: HashMap<WireId, Vec<(BelId, IdString)>> = HashMap::new();
        let mut bel_by_loc = HashMap::new();

        for tile in 0 .. self.db.tiles.len() as u32 {
            let tt = self.tile_type(tile);
            let (x, y) = self.tile_xy(tile);
            for (pip_idx, pip) in tt.pips.iter().enumerate() {
                let id = PipId::new(tile, pip_idx as u32);
                let src = self.canonical_wire(WireId::new(tile, pip.src_wire));
                let dst = self.canonical_wire(WireId::new(tile, pip.dst_wire));
                downhill.entry(src).or_default().push(id);
                uphill.entry(dst).or_default().push(id);
            }
            for (bel_idx, bel) in tt.bels.iter().enumerate() {
                let id = BelId::new(tile, bel_idx as u32);
                if bel_by_loc.insert(Loc::new(x, y, bel.z), id).is_some() {
                    return Err(DbError::Inconsistent(format!(
                        "two bels at X{}Y{}Z{}", x, y, bel.z
                    )));
                }
                for pin in &bel.pins {
                    let wire = self.canonical_wire(WireId::new(tile, pin.wire));
                    wire_bel_pins.entry(wire).or_default().push((id, pin.name));
                }
            }
        }

        self.downhill = downhill;
        self.uphill = uphill;
        self.wire_bel_pins = wire_bel_pins;
        self.bel_by_loc = bel_by_loc;
        Ok(())
    }

    pub fn db(&self) -> &ChipDb {
        &self.db
    }

    pub fn width(&self) -> i32 {
        self.db.width as i32
    }

    pub fn height(&self) -> i32 {
        self.db.height as i32
    }

    pub fn tile_count(&self) -> u32 {
        self.db.tiles.len() as u32
    }

    pub fn tile_xy(&self, tile: u32) -> (i32, i32) {
        ((tile % self.db.width) as i32, (tile / self.db.width) as i32)
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return None;
        }
        Some(y as u32 * self.db.width + x as u32)
    }

    pub fn tile_inst(&self, tile: u32) -> &TileInstData {
        &self.db.tiles[tile as usize]
    }

    pub fn tile_type(&self, tile: u32) -> &TileTypeData {
        &self.db.tile_types[self.db.tiles[tile as usize].type_idx as usize]
    }

    /* Bels */

    pub fn bels<'s>(&'s self) -> impl Iterator<Item = BelId> + 's {
        (0 .. self.tile_count()).flat_map(move |tile| {
            (0 .. self.tile_type(tile).bels.len() as u32).map(move |idx| BelId::new(tile, idx))
        })
    }

    /// Whether `bel` names a bel of this device. Ids coming from outside the database
    /// (netlists, records) must pass this before any other bel lookup.
    pub fn is_bel(&self, bel: BelId) -> bool {
        bel.tile < self.tile_count() && (bel.index as usize) < self.tile_type(bel.tile).bels.len()
    }

    pub fn bel_data(&self, bel: BelId) -> &BelData {
        &self.tile_type(bel.tile).bels[bel.index as usize]
    }

    pub fn bel_type(&self, bel: BelId) -> IdString {
        self.bel_data(bel).bel_type
    }

    pub fn bel_name(&self, bel: BelId) -> IdString {
        self.bel_data(bel).name
    }

    pub fn bel_location(&self, bel: BelId) -> Loc {
        let (x, y) = self.tile_xy(bel.tile);
        Loc::new(x, y, self.bel_data(bel).z)
    }

    pub fn bel_by_location(&self, loc: Loc) -> Option<BelId> {
        self.bel_by_loc.get(&loc).copied()
    }

    pub fn bel_pin_wire(&self, bel: BelId, pin: IdString) -> Option<WireId> {
        self.bel_data(bel).pins.iter()
            .find(|p| p.name == pin)
            .map(|p| self.canonical_wire(WireId::new(bel.tile, p.wire)))
    }

    pub fn bel_mux_group(&self, bel: BelId) -> Option<&MuxGroup> {
        let group = self.bel_data(bel).extra.as_ref()?.mux_group?;
        self.tile_type(bel.tile).mux_groups.get(group as usize)
    }

    /* Wires */

    pub fn canonical_wire(&self, wire: WireId) -> WireId {
        self.canonical.get(&wire).copied().unwrap_or(wire)
    }

    /// Every tile wire making up a (canonical) wire.
    pub fn wire_members(&self, wire: WireId) -> Vec<WireId> {
        match self.node_members.get(&wire) {
            Some(members) => members.clone(),
            None => vec![wire],
        }
    }

    pub fn tile_wire_data(&self, wire: WireId) -> &TileWireData {
        &self.tile_type(wire.tile).wires[wire.index as usize]
    }

    pub fn wire_name(&self, wire: WireId) -> IdString {
        self.tile_wire_data(wire).name
    }

    pub fn wire_type(&self, wire: WireId) -> IdString {
        self.tile_wire_data(wire).wire_type
    }

    pub fn wire_flags(&self, wire: WireId) -> u32 {
        self.tile_wire_data(wire).flags
    }

    pub fn wire_bel_pins(&self, wire: WireId) -> &[(BelId, IdString)] {
        self.wire_bel_pins.get(&wire).map(|v| &v[..]).unwrap_or(&[])
    }

    pub fn pips_downhill(&self, wire: WireId) -> &[PipId] {
        self.downhill.get(&wire).map(|v| &v[..]).unwrap_or(&[])
    }

    pub fn pips_uphill(&self, wire: WireId) -> &[PipId] {
        self.uphill.get(&wire).map(|v| &v[..]).unwrap_or(&[])
    }

    /* Pips */

    pub fn pip_data(&self, pip: PipId) -> &PipData {
        &self.tile_type(pip.tile).pips[pip.index as usize]
    }

    pub fn pip_src_wire(&self, pip: PipId) -> WireId {
        self.canonical_wire(WireId::new(pip.tile, self.pip_data(pip).src_wire))
    }

    pub fn pip_dst_wire(&self, pip: PipId) -> WireId {
        self.canonical_wire(WireId::new(pip.tile, self.pip_data(pip).dst_wire))
    }

    /// The tile-local source wire, before node canonicalization.
    pub fn pip_src_tile_wire(&self, pip: PipId) -> WireId {
        WireId::new(pip.tile, self.pip_data(pip).src_wire)
    }

    pub fn pip_extra(&self, pip: PipId) -> Option<&PipExtra> {
        self.pip_data(pip).extra.as_ref()
    }
}
