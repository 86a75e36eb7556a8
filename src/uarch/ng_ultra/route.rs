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

use std::collections::{HashMap, HashSet, VecDeque};

use crate::chipdb::{PipExtraKind, WIRE_FLAG_LOWSKEW};
use crate::common::*;
use crate::context::Context;
use crate::error::{ArchError, ArchResult};
use crate::netlist::PortRef;
use crate::strings::IdString;
use super::NgUltra;
use super::clocks::DriverTier;
use super::constids::ID;
use super::legality::{is_cascade_input, is_cascade_output};

#[derive(Debug, Default)]
pub struct LowSkewReport {
    /// Nets that got a dedicated route, in routing order
    pub nets: Vec<IdString>,
    pub pips: usize,
    /// Sinks left to the general router
    pub skipped: usize,
}

fn no_path(net: IdString, sink: &PortRef) -> ArchError {
    ArchError::NoLowSkewPath { net: net.to_str(), sink: format!("{}.{}", sink.cell, sink.port) }
}

impl NgUltra {
    pub fn check_pip_avail(&self, pip: PipId) -> bool {
        !self.blocked_pips.contains(&pip)
    }

    pub fn blocked_pips(&self) -> &HashSet<PipId> {
        &self.blocked_pips
    }

    pub fn reset_blocked_pips(&mut self) {
        self.blocked_pips.clear();
    }

    /// Undoes everything `route_lowskew` did.
    pub fn reset_lowskew(&mut self, ctx: &mut Context) {
        for wire in self.lowskew_wires.drain(..) {
            ctx.unbind_wire(wire);
        }
        self.blocked_pips.clear();
        self.unused_wfg.clear();
        self.unused_pll.clear();
    }

    /// Driver and the users a net must reach over low-skew resources.
    fn lowskew_targets(&self, ctx: &Context, net: IdString) -> Option<(Option<PortRef>, Vec<PortRef>)> {
        let ni = ctx.net(net)?;
        let source_driven = match &ni.driver {
            Some(driver) => self.driver_tier(ctx, driver) != DriverTier::Fabric,
            None => false,
        };
        let sinks: Vec<_> = ni.users.iter()
            .filter(|user| source_driven || self.is_lowskew_sink(ctx, user))
            .copied()
            .collect();
        if sinks.is_empty() {
            return None;
        }
        Some((ni.driver, sinks))
    }

    fn port_wire(&self, ctx: &Context, pref: &PortRef) -> Option<WireId> {
        let bel = ctx.cell(pref.cell)?.bel?;
        ctx.device.bel_pin_wire(bel, pref.port)
    }

    /// Pip crossing a bel is usable only while the bel is empty.
    fn route_through_free(&self, ctx: &Context, pip: PipId) -> bool {
        match ctx.device.pip_extra(pip) {
            Some(extra) if extra.kind == PipExtraKind::Bypass => match extra.bel {
                Some(idx) => ctx.check_bel_avail(BelId::new(pip.tile, idx)),
                None => true,
            },
            _ => true,
        }
    }

    /// Breadth-first search from the routed tree of `net` to `target`, staying on
    /// low-skew wires.
    fn find_lowskew_path(&self, ctx: &Context, net: IdString, target: WireId) -> Option<Vec<PipId>> {
        let dev = &ctx.device;
        let mut queue = VecDeque::new();
        let mut visited: HashMap<WireId, Option<PipId>> = HashMap::new();

        let mut tree: Vec<_> = ctx.net(net)?.wires.keys().copied().collect();
        tree.sort();
        for wire in tree {
            visited.insert(wire, None);
            queue.push_back(wire);
        }

        while let Some(wire) = queue.pop_front() {
            if wire == target {
                let mut path = Vec::new();
                let mut cursor = wire;
                while let Some(Some(pip)) = visited.get(&cursor) {
                    path.push(*pip);
                    cursor = dev.pip_src_wire(*pip);
                }
                path.reverse();
                return Some(path);
            }
            for pip in dev.pips_downhill(wire) {
                if !self.check_pip_avail(*pip) || ctx.bound_pip_net(*pip).is_some() {
                    continue;
                }
                let dst = dev.pip_dst_wire(*pip);
                if visited.contains_key(&dst) {
                    continue;
                }
                if dst != target && dev.wire_flags(dst) & WIRE_FLAG_LOWSKEW == 0 {
                    continue;
                }
                if ctx.bound_wire_net(dst).map_or(false, |other| other != net) {
                    continue;
                }
                if !self.route_through_free(ctx, *pip) {
                    continue;
                }
                visited.insert(dst, Some(*pip));
                queue.push_back(dst);
            }
        }
        None
    }

    fn commit_lowskew_path(&mut self, ctx: &mut Context, net: IdString, sink: &PortRef, path: &[PipId])
        -> ArchResult<()>
    {
        for pip in path {
            let dst = ctx.device.pip_dst_wire(*pip);
            let competing: Vec<_> = ctx.device.pips_uphill(dst).iter()
                .filter(|other| **other != *pip)
                .copied()
                .collect();
            let bypassed = match ctx.device.pip_extra(*pip) {
                Some(extra) if extra.kind == PipExtraKind::Bypass =>
                    extra.bel.map(|idx| BelId::new(pip.tile, idx)),
                _ => None,
            };

            if !ctx.bind_pip(*pip, net) {
                return Err(no_path(net, sink));
            }
            self.lowskew_wires.push(dst);
            self.blocked_pips.insert(*pip);
            self.blocked_pips.extend(competing);

            if let Some(bel) = bypassed {
                let bel_type = ctx.device.bel_type(bel);
                if bel_type == ID.WFG {
                    self.unused_wfg.entry(bel).or_insert_with(|| idf!("{}$wfg_bypass", net));
                } else if bel_type == ID.PLL {
                    self.unused_pll.entry(bel).or_insert_with(|| idf!("{}$pll_bypass", net));
                }
            }
        }
        Ok(())
    }

    /// Reserves dedicated paths for ring/tube clock nets before general routing.
    pub fn route_lowskew(&mut self, ctx: &mut Context) -> ArchResult<LowSkewReport> {
        let mut report = LowSkewReport::default();
        let nets: Vec<_> = ctx.netlist.sorted_nets().iter().map(|n| n.name).collect();

        for net in nets {
            let (driver, sinks) = match self.lowskew_targets(ctx, net) {
                Some(targets) => targets,
                None => continue,
            };
            let driver = match driver {
                Some(driver) => driver,
                None => {
                    log_warn!("clock net {} has no driver, skipping low-skew routing", net);
                    report.skipped += sinks.len();
                    continue;
                }
            };
            let src = match self.port_wire(ctx, &driver) {
                Some(src) => src,
                None => {
                    log_warn!("driver {}.{} of clock net {} is not placed", driver.cell, driver.port, net);
                    report.skipped += sinks.len();
                    continue;
                }
            };
            if !ctx.bind_wire(src, net) {
                return Err(no_path(net, &driver));
            }
            self.lowskew_wires.push(src);

            let mut routed = false;
            for sink in &sinks {
                let dst = match self.port_wire(ctx, sink) {
                    Some(dst) => dst,
                    None => {
                        log_warn!("sink {}.{} of clock net {} is not placed", sink.cell, sink.port, net);
                        report.skipped += 1;
                        continue;
                    }
                };
                if ctx.bound_wire_net(dst) == Some(net) {
                    continue;
                }
                let path = self.find_lowskew_path(ctx, net, dst).ok_or_else(|| no_path(net, sink))?;
                dbg_log!(crate::log::DBG_INFO, "net {}: {} pips to {}.{}", net, path.len(), sink.cell, sink.port);
                report.pips += path.len();
                self.commit_lowskew_path(ctx, net, sink, &path)?;
                routed = true;
            }
            if routed {
                report.nets.push(net);
            }
        }

        log_info!("Low-skew routing reserved {} pips for {} nets", report.pips, report.nets.len());
        Ok(report)
    }

    pub fn get_route_bounding_box(&self, ctx: &Context, src: WireId, dst: WireId) -> BoundingBox {
        let dev = &ctx.device;
        let src = dev.canonical_wire(src);
        let dst = dev.canonical_wire(dst);
        let (x, y) = dev.tile_xy(src.tile);
        let mut bb = BoundingBox::around(x, y);
        for wire in dev.wire_members(src).into_iter().chain(dev.wire_members(dst)) {
            let (x, y) = dev.tile_xy(wire.tile);
            bb.extend(x, y);
        }

        /* Snap to the 4x4 TILE grid so the box follows the switchbox structure */
        let margin = self.opts.bbox_margin;
        BoundingBox {
            x0: ((bb.x0 & !3) - margin).max(0),
            y0: ((bb.y0 & !3) - margin).max(0),
            x1: ((bb.x1 | 3) + margin).min(dev.width() - 1),
            y1: ((bb.y1 | 3) + margin).min(dev.height() - 1),
        }
    }

    fn distance_delay(&self, dx: i32, dy: i32) -> Delay {
        self.opts.delay_base + self.opts.delay_per_x * dx.abs() + self.opts.delay_per_y * dy.abs()
    }

    pub fn estimate_delay(&self, ctx: &Context, src: WireId, dst: WireId) -> Delay {
        let dev = &ctx.device;
        let src = dev.canonical_wire(src);
        let dst = dev.canonical_wire(dst);
        if src == dst {
            return 0;
        }
        if src.tile == dst.tile {
            return self.opts.delay_local;
        }
        let (sx, sy) = dev.tile_xy(src.tile);
        let (dx, dy) = dev.tile_xy(dst.tile);
        self.distance_delay(dx - sx, dy - sy)
    }

    pub fn predict_delay(&self, ctx: &Context, src_bel: BelId, src_pin: IdString,
                         dst_bel: BelId, dst_pin: IdString) -> Delay {
        if self.dsp_cascade.get(&src_bel) == Some(&dst_bel)
            && is_cascade_output(src_pin) && is_cascade_input(dst_pin)
        {
            return self.opts.delay_cascade;
        }
        if src_bel.tile == dst_bel.tile {
            return self.opts.delay_local;
        }
        let src = ctx.device.bel_location(src_bel);
        let dst = ctx.device.bel_location(dst_bel);
        self.distance_delay(dst.x - src.x, dst.y - src.y)
    }
}
