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

use crate::chipdb::Device;
use crate::common::*;
use crate::error::DbError;
use crate::netlist::{CellInfo, NetInfo, Netlist};
use crate::strings::IdString;

/// Device plus the design being implemented on it, together with the bel, wire and pip
/// bindings. This is the state a placer and router share with the architecture core.
pub struct Context {
    pub device: Device,
    pub netlist: Netlist,
    bel_to_cell: HashMap<BelId, IdString>,
    wire_to_net: HashMap<WireId, IdString>,
    pip_to_net: HashMap<PipId, IdString>,
}

impl Context {
    /// Cells which already carry a `bel` in the netlist get bound to it. Placements and
    /// location constraints naming bels the device doesn't have are rejected, as are two
    /// cells placed on one bel.
    pub fn new(device: Device, netlist: Netlist) -> Result<Self, DbError> {
        let mut bel_to_cell = HashMap::new();
        for cell in netlist.sorted_cells() {
            for bel in cell.bel.iter().chain(cell.constr_bel.iter()) {
                if !device.is_bel(*bel) {
                    return Err(DbError::Inconsistent(format!(
                        "cell {} refers to missing bel {}/{}", cell.name, bel.tile, bel.index
                    )));
                }
            }
            if let Some(bel) = cell.bel {
                if let Some(other) = bel_to_cell.insert(bel, cell.name) {
                    return Err(DbError::Inconsistent(format!(
                        "cells {} and {} are both placed at {}/{}", other, cell.name, bel.tile, bel.index
                    )));
                }
            }
        }
        Ok(Self {
            device,
            netlist,
            bel_to_cell,
            wire_to_net: HashMap::new(),
            pip_to_net: HashMap::new(),
        })
    }

    pub fn cell(&self, name: IdString) -> Option<&CellInfo> {
        self.netlist.cells.get(&name)
    }

    pub fn net(&self, name: IdString) -> Option<&NetInfo> {
        self.netlist.nets.get(&name)
    }

    /* Bels */

    pub fn bound_bel_cell(&self, bel: BelId) -> Option<&CellInfo> {
        self.bel_to_cell.get(&bel).and_then(|c| self.netlist.cells.get(c))
    }

    pub fn check_bel_avail(&self, bel: BelId) -> bool {
        !self.bel_to_cell.contains_key(&bel)
    }

    /// Binds `cell` to `bel`, moving it if it was placed elsewhere. Returns `false` if the
    /// bel is taken or either of them doesn't exist.
    pub fn bind_bel(&mut self, bel: BelId, cell: IdString) -> bool {
        if !self.device.is_bel(bel) || !self.check_bel_avail(bel) {
            return false;
        }
        let c = match self.netlist.cells.get_mut(&cell) {
            Some(c) => c,
            None => return false,
        };
        if let Some(old) = c.bel.replace(bel) {
            self.bel_to_cell.remove(&old);
        }
        self.bel_to_cell.insert(bel, cell);
        true
    }

    pub fn unbind_bel(&mut self, bel: BelId) -> Option<IdString> {
        let cell = self.bel_to_cell.remove(&bel)?;
        if let Some(c) = self.netlist.cells.get_mut(&cell) {
            c.bel = None;
        }
        Some(cell)
    }

    /// Bels with a cell on them, in bel order.
    pub fn bound_bels(&self) -> Vec<(BelId, IdString)> {
        let mut bound: Vec<_> = self.bel_to_cell.iter().map(|(b, c)| (*b, *c)).collect();
        bound.sort();
        bound
    }

    /* Wires and pips */

    pub fn bound_wire_net(&self, wire: WireId) -> Option<IdString> {
        self.wire_to_net.get(&wire).copied()
    }

    pub fn bound_pip_net(&self, pip: PipId) -> Option<IdString> {
        self.pip_to_net.get(&pip).copied()
    }

    /// Binds a routing source. Fails if the wire belongs to another net.
    pub fn bind_wire(&mut self, wire: WireId, net: IdString) -> bool {
        if let Some(other) = self.wire_to_net.get(&wire) {
            return *other == net;
        }
        let n = match self.netlist.nets.get_mut(&net) {
            Some(n) => n,
            None => return false,
        };
        n.wires.insert(wire, None);
        self.wire_to_net.insert(wire, net);
        true
    }

    /// Binds `pip` and the wire it drives to `net`.
    pub fn bind_pip(&mut self, pip: PipId, net: IdString) -> bool {
        let dst = self.device.pip_dst_wire(pip);
        if self.pip_to_net.contains_key(&pip) || self.wire_to_net.contains_key(&dst) {
            return false;
        }
        let n = match self.netlist.nets.get_mut(&net) {
            Some(n) => n,
            None => return false,
        };
        n.wires.insert(dst, Some(pip));
        self.wire_to_net.insert(dst, net);
        self.pip_to_net.insert(pip, net);
        true
    }

    /// Releases a wire and the pip that drives it.
    pub fn unbind_wire(&mut self, wire: WireId) {
        let net = match self.wire_to_net.remove(&wire) {
            Some(net) => net,
            None => return,
        };
        if let Some(n) = self.netlist.nets.get_mut(&net) {
            if let Some(Some(pip)) = n.wires.remove(&wire) {
                self.pip_to_net.remove(&pip);
            }
        }
    }
}
