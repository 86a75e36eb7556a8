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
use crate::context::Context;
use crate::netlist::CellInfo;
use crate::strings::IdString;
use super::NgUltra;
use super::constids::ID;
use super::legality::{is_cascade_input, is_cascade_output};

/// Dedicated DSP to DSP links: from a cascade output pin, one pip (or a shared node) away
/// from the next DSP's cascade input.
pub fn build_dsp_cascade(dev: &Device) -> HashMap<BelId, BelId> {
    let mut cascade = HashMap::new();
    for bel in dev.bels().filter(|bel| dev.bel_type(*bel) == ID.DSP) {
        let outputs = dev.bel_data(bel).pins.iter()
            .filter(|pin| is_cascade_output(pin.name))
            .filter_map(|pin| dev.bel_pin_wire(bel, pin.name));
        'pins: for wire in outputs {
            let mut reachable = vec![wire];
            reachable.extend(dev.pips_downhill(wire).iter().map(|pip| dev.pip_dst_wire(*pip)));
            for w in reachable {
                let next = dev.wire_bel_pins(w).iter().find(|(other, pin)| {
                    *other != bel && dev.bel_type(*other) == ID.DSP && is_cascade_input(*pin)
                });
                if let Some((next, _)) = next {
                    cascade.insert(bel, *next);
                    break 'pins;
                }
            }
        }
    }
    cascade
}

impl NgUltra {
    pub fn get_cluster_placement(&self, ctx: &Context, cluster: IdString, root_bel: BelId)
        -> Option<Vec<(IdString, BelId)>>
    {
        let root = ctx.cell(cluster)?;
        let dev = &ctx.device;
        if !dev.is_bel(root_bel) {
            return None;
        }

        let mut root_bel = root_bel;
        let mut root_loc = dev.bel_location(root_bel);
        if root.constr_abs_z {
            root_loc.z = root.constr_z;
            root_bel = dev.bel_by_location(root_loc)?;
        }

        let mut placement = vec![(root.name, root_bel)];
        if root.cell_type == ID.DSP && !root.constr_children.is_empty() {
            let mut prev = root_bel;
            for child in &root.constr_children {
                let next = *self.dsp_cascade.get(&prev)?;
                if placement.iter().any(|(_, bel)| *bel == next) {
                    return None;
                }
                placement.push((*child, next));
                prev = next;
            }
        } else if !self.get_child_placement(ctx, root, root_loc, &mut placement) {
            return None;
        }

        /* Members placed early were checked before their siblings had a site */
        for (name, bel) in &placement {
            let cell = ctx.cell(*name)?;
            if !self.member_fits(ctx, cell, *bel, &placement) {
                dbg_log!(crate::log::DBG_EXTRA, "cluster {} rejected at {:?}", cluster, root_bel);
                return None;
            }
        }
        Some(placement)
    }

    /// Places the dependents of `parent` relative to `root_loc`, recursively. Every derived
    /// site must exist, be free within the cluster and pass the placement checks against
    /// the members placed so far.
    pub fn get_child_placement(&self, ctx: &Context, parent: &CellInfo, root_loc: Loc,
                               placement: &mut Vec<(IdString, BelId)>) -> bool
    {
        for name in &parent.constr_children {
            let child = match ctx.cell(*name) {
                Some(child) => child,
                None => return false,
            };
            let loc = Loc::new(
                root_loc.x + child.constr_x,
                root_loc.y + child.constr_y,
                if child.constr_abs_z { child.constr_z } else { root_loc.z + child.constr_z },
            );
            let bel = match ctx.device.bel_by_location(loc) {
                Some(bel) => bel,
                None => return false,
            };
            if placement.iter().any(|(_, other)| *other == bel) {
                return false;
            }
            placement.push((child.name, bel));
            if !self.member_fits(ctx, child, bel, placement) {
                return false;
            }
            if !self.get_child_placement(ctx, child, loc, placement) {
                return false;
            }
        }
        true
    }

    fn member_fits(&self, ctx: &Context, cell: &CellInfo, bel: BelId, placement: &[(IdString, BelId)])
        -> bool
    {
        if !self.is_valid_bel_for_cell_type(ctx, cell.cell_type, bel) {
            return false;
        }
        match self.check_cell_at(ctx, cell, bel, placement) {
            Ok(()) => true,
            Err(why) => {
                dbg_log!(crate::log::DBG_EXTRA, "{} can't join its cluster at {:?}: {}", cell.name, bel, why);
                false
            }
        }
    }
}
