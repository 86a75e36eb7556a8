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

use std::collections::BTreeSet;

use thiserror::Error;

use crate::chipdb::BEL_FLAG_HIDDEN;
use crate::common::*;
use crate::context::Context;
use crate::netlist::CellInfo;
use crate::strings::{GlobalStringsCtx, IdString};
use super::NgUltra;
use super::clocks::{assign_gcks, ClockRequest, DriverTier, SinkTier};
use super::constids::{io_family, ID};

/// Why a cell can't sit on a bel.
#[derive(Debug, Error)]
pub enum Invalid {
    #[error("bank {bank} runs at {bank_voltage}, cell needs {voltage}")]
    BankVoltage { bank: String, voltage: String, bank_voltage: String },
    #[error("shared mux input {port} is driven by {other_net} for {other}")]
    MuxGroup { port: IdString, other: IdString, other_net: IdString },
    #[error("mux of {port} is set to {decoded}, cell requires {wanted}")]
    MuxValue { port: IdString, decoded: u8, wanted: i64 },
    #[error("{port} needs the dedicated cascade link to {other}")]
    DspCascade { port: IdString, other: IdString },
    #[error("lobe {lobe} can't serve {nets} clock nets with {gcks} GCKs")]
    ClockCapacity { lobe: u32, nets: usize, gcks: usize },
}

fn has_prefix(port: IdString, prefixes: &[&str]) -> bool {
    let gsctx = GlobalStringsCtx::hold();
    let name = port.get(&gsctx);
    prefixes.iter().any(|p| name.starts_with(p))
}

pub fn is_cascade_input(port: IdString) -> bool {
    has_prefix(port, &["CAI", "CBI", "CCI", "CZI"])
}

pub fn is_cascade_output(port: IdString) -> bool {
    has_prefix(port, &["CAO", "CBO", "CCO", "CZO"])
}

/// Normalizes `3.3`, `3.3V` or `LVCMOS_3.3V_...` style values to `3.3V`.
pub fn parse_voltage(s: &str) -> Option<String> {
    s.split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter_map(|tok| {
            let num = tok.strip_suffix('V').or_else(|| tok.strip_suffix('v')).unwrap_or(tok);
            num.parse::<f32>().ok()
        })
        .next()
        .map(|v| format!("{:.1}V", v))
}

/// Voltage an I/O cell imposes on its bank, if it imposes one.
pub fn cell_voltage(cell: &CellInfo) -> Option<String> {
    if let Some(v) = cell.param("voltage") {
        return parse_voltage(&v.as_string());
    }
    let standard = cell.param("standard")?.as_string();
    /* Only a token carrying an explicit `V` counts inside a standard name */
    standard.split('_')
        .filter(|tok| tok.ends_with('V') || tok.ends_with('v'))
        .find_map(parse_voltage)
}

/// Candidate positions of cells that are about to move. They shadow the context bindings.
pub(super) struct View<'a> {
    ctx: &'a Context,
    moves: &'a [(IdString, BelId)],
}

impl<'a> View<'a> {
    pub(super) fn new(ctx: &'a Context, moves: &'a [(IdString, BelId)]) -> Self {
        Self { ctx, moves }
    }

    fn cell_bel(&self, cell: IdString) -> Option<BelId> {
        match self.moves.iter().find(|(c, _)| *c == cell) {
            Some((_, bel)) => Some(*bel),
            None => self.ctx.cell(cell)?.bel,
        }
    }

    fn cell_at(&self, bel: BelId) -> Option<&'a CellInfo> {
        if let Some((cell, _)) = self.moves.iter().find(|(_, b)| *b == bel) {
            return self.ctx.cell(*cell);
        }
        let bound = self.ctx.bound_bel_cell(bel)?;
        if self.moves.iter().any(|(c, _)| *c == bound.name) {
            return None;
        }
        Some(bound)
    }
}

impl NgUltra {
    pub fn get_bel_bucket_for_cell_type(&self, cell_type: IdString) -> IdString {
        if cell_type.in_list(&io_family()) {
            ID.IOP
        } else if cell_type.in_list(&[ID.DDE, ID.TDE, ID.CDC, ID.BGC, ID.GBC, ID.XCDC]) {
            ID.CDC
        } else if cell_type.in_list(&[ID.FIFO, ID.XHFIFO, ID.XWFIFO]) {
            ID.FIFO
        } else if cell_type.in_list(&[ID.RF, ID.RFSP, ID.XHRF, ID.XWRF, ID.XPRF]) {
            ID.RF
        } else {
            cell_type
        }
    }

    pub fn is_valid_bel_for_cell_type(&self, ctx: &Context, cell_type: IdString, bel: BelId) -> bool {
        if self.unused_wfg.contains_key(&bel) || self.unused_pll.contains_key(&bel) {
            return false;
        }
        if !ctx.device.is_bel(bel) {
            return false;
        }
        let data = ctx.device.bel_data(bel);
        if data.flags & BEL_FLAG_HIDDEN != 0 {
            return false;
        }
        self.get_bel_bucket_for_cell_type(cell_type) == self.get_bel_bucket_for_cell_type(data.bel_type)
    }

    pub fn is_bel_location_valid(&self, ctx: &Context, bel: BelId, explain_invalid: bool) -> bool {
        if !ctx.device.is_bel(bel) {
            return false;
        }
        let cell = match ctx.bound_bel_cell(bel) {
            Some(cell) => cell,
            None => return true,
        };
        match self.check_cell_at(ctx, cell, bel, &[]) {
            Ok(()) => true,
            Err(why) => {
                if explain_invalid {
                    log_info!("{} is not valid at {}/{}: {}",
                        cell.name, self.tile_name(bel.tile), ctx.device.bel_name(bel), why);
                }
                false
            }
        }
    }

    /// Runs the placement checks for `cell` at `bel`, with `moves` overriding the current
    /// positions of other cells.
    pub fn check_cell_at(&self, ctx: &Context, cell: &CellInfo, bel: BelId, moves: &[(IdString, BelId)])
        -> Result<(), Invalid>
    {
        let view = View::new(ctx, moves);
        if cell.cell_type.in_list(&io_family()) {
            self.check_bank_voltage(cell, bel)?;
        }
        self.check_mux_group(ctx, &view, cell, bel)?;
        if cell.cell_type == ID.DSP {
            self.check_dsp_cascade(ctx, &view, cell, bel)?;
        }
        self.check_clock_capacity(ctx, moves, cell, bel)
    }

    fn check_bank_voltage(&self, cell: &CellInfo, bel: BelId) -> Result<(), Invalid> {
        let voltage = match cell_voltage(cell) {
            Some(v) => v,
            None => return Ok(()),
        };
        let bank = self.tiles.bank(bel.tile);
        let bank_voltage = match self.bank_voltage.get(bank) {
            Some(v) => Some(v.clone()),
            /* No configuration: the I/Os already in the bank decide */
            None => self.bank_io_voltages.get(bank).and_then(|used| {
                used.iter()
                    .find(|(v, count)| **count > 0 && **v != voltage)
                    .map(|(v, _)| v.clone())
            }),
        };
        match bank_voltage {
            Some(bv) if bv != voltage => Err(Invalid::BankVoltage {
                bank: bank.to_string(),
                voltage,
                bank_voltage: bv,
            }),
            _ => Ok(()),
        }
    }

    fn check_mux_group(&self, ctx: &Context, view: &View, cell: &CellInfo, bel: BelId)
        -> Result<(), Invalid>
    {
        if let Some(group) = ctx.device.bel_mux_group(bel) {
            for port in &group.ports {
                let net = match cell.port_net(*port) {
                    Some(net) => net,
                    None => continue,
                };
                for idx in &group.bels {
                    let other_bel = BelId::new(bel.tile, *idx);
                    if other_bel == bel {
                        continue;
                    }
                    let other = match view.cell_at(other_bel) {
                        Some(other) if other.name != cell.name => other,
                        _ => continue,
                    };
                    match other.port_net(*port) {
                        Some(other_net) if other_net != net => return Err(Invalid::MuxGroup {
                            port: *port,
                            other: other.name,
                            other_net,
                        }),
                        _ => (),
                    }
                }
            }
        }

        for port in cell.ports.keys() {
            let wanted = match cell.param(&format!("{}_mux", port)).and_then(|p| p.as_int()) {
                Some(wanted) => wanted,
                None => continue,
            };
            if let Some(decoded) = self.get_mux_data(ctx, bel, *port) {
                if decoded as i64 != wanted {
                    return Err(Invalid::MuxValue { port: *port, decoded, wanted });
                }
            }
        }
        Ok(())
    }

    fn check_dsp_cascade(&self, ctx: &Context, view: &View, cell: &CellInfo, bel: BelId)
        -> Result<(), Invalid>
    {
        for (port, info) in &cell.ports {
            let net = match info.net.and_then(|n| ctx.net(n)) {
                Some(net) => net,
                None => continue,
            };
            if is_cascade_input(*port) {
                let driver = match net.driver {
                    Some(driver) if driver.cell != cell.name => driver,
                    _ => continue,
                };
                let is_dsp = ctx.cell(driver.cell).map_or(false, |c| c.cell_type == ID.DSP);
                if let (true, Some(driver_bel)) = (is_dsp, view.cell_bel(driver.cell)) {
                    if self.dsp_cascade.get(&driver_bel) != Some(&bel) {
                        return Err(Invalid::DspCascade { port: *port, other: driver.cell });
                    }
                }
            } else if is_cascade_output(*port) {
                for user in &net.users {
                    if user.cell == cell.name
                        || !ctx.cell(user.cell).map_or(false, |c| c.cell_type == ID.DSP)
                    {
                        continue;
                    }
                    if let Some(user_bel) = view.cell_bel(user.cell) {
                        if self.dsp_cascade.get(&bel) != Some(&user_bel) {
                            return Err(Invalid::DspCascade { port: *port, other: user.cell });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Clock nets a cell consumes on GCK-fed (fabric or ring) clock inputs.
    pub(super) fn gck_clock_nets<'c>(&'c self, cell: &'c CellInfo) -> impl Iterator<Item = IdString> + 'c {
        cell.ports.iter().filter_map(move |(port, info)| {
            match self.clocks.sink_tier(cell.cell_type, *port) {
                Some(SinkTier::Fabric) | Some(SinkTier::Ring) => info.net,
                _ => None,
            }
        })
    }

    fn check_clock_capacity(&self, ctx: &Context, moves: &[(IdString, BelId)], cell: &CellInfo, bel: BelId)
        -> Result<(), Invalid>
    {
        let mut nets: BTreeSet<IdString> = self.gck_clock_nets(cell).collect();
        if nets.is_empty() {
            return Ok(());
        }
        let lobe = match self.tiles.lobe(bel.tile) {
            Some(lobe) => lobe,
            None => return Ok(()),
        };
        let configs = match self.gck_per_lobe.get(&lobe) {
            Some(configs) => configs,
            None => return Ok(()),
        };

        if let Some(used) = self.lobe_clocks.get(&lobe) {
            nets.extend(used.iter().filter(|(_, count)| **count > 0).map(|(net, _)| *net));
        }
        for (other, other_bel) in moves {
            if self.tiles.lobe(other_bel.tile) != Some(lobe) {
                continue;
            }
            if let Some(other) = ctx.cell(*other) {
                nets.extend(self.gck_clock_nets(other));
            }
        }
        if nets.len() > configs.len() {
            return Err(Invalid::ClockCapacity { lobe, nets: nets.len(), gcks: configs.len() });
        }

        let requests: Vec<_> = nets.iter().map(|net| self.clock_request(ctx, *net)).collect();
        match assign_gcks(&ctx.device, configs, &requests, self.opts.gck_select) {
            Some(_) => Ok(()),
            None => Err(Invalid::ClockCapacity { lobe, nets: nets.len(), gcks: configs.len() }),
        }
    }

    pub(super) fn clock_request(&self, ctx: &Context, net: IdString) -> ClockRequest {
        let driver = ctx.net(net).and_then(|n| n.driver);
        let tier = match &driver {
            Some(driver) => self.driver_tier(ctx, driver),
            None => DriverTier::Fabric,
        };
        let driver = driver
            .and_then(|d| ctx.cell(d.cell))
            .and_then(|c| c.bel)
            .map(|bel| ctx.device.bel_location(bel));
        ClockRequest { net, tier, driver }
    }

    /// Keeps the per-lobe clock and per-bank voltage occupancy in sync with bindings.
    pub(super) fn track_binding(&mut self, ctx: &Context, bel: BelId, cell: IdString, bound: bool) {
        let cell = match ctx.cell(cell) {
            Some(cell) => cell,
            None => return,
        };
        if let Some(lobe) = self.tiles.lobe(bel.tile) {
            let nets: Vec<_> = self.gck_clock_nets(cell).collect();
            let used = self.lobe_clocks.entry(lobe).or_default();
            for net in nets {
                let count = used.entry(net).or_insert(0);
                if bound {
                    *count += 1;
                } else {
                    *count = count.saturating_sub(1);
                }
            }
            used.retain(|_, count| *count > 0);
        }
        let voltage = match cell.cell_type.in_list(&io_family()) {
            true => cell_voltage(cell),
            false => None,
        };
        if let Some(voltage) = voltage {
            let bank = self.tiles.bank(bel.tile).to_string();
            let used = self.bank_io_voltages.entry(bank).or_default();
            let count = used.entry(voltage).or_insert(0);
            if bound {
                *count += 1;
            } else {
                *count = count.saturating_sub(1);
            }
            used.retain(|_, count| *count > 0);
        }
        dbg_log!(crate::log::DBG_EXTRA, "{} {} at tile {}",
            if bound { "bound" } else { "unbound" }, cell.name, bel.tile);
    }
}
