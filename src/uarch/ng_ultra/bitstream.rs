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

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::Value;

use crate::chipdb::PipExtraKind;
use crate::common::*;
use crate::context::Context;
use crate::error::{ArchError, ArchResult};
use crate::netlist::{CellInfo, NetInfo};
use crate::strings::IdString;
use super::NgUltra;
use super::constids::{io_family, ID};
use super::tiles::strip_tile_type;

#[derive(Serialize)]
pub struct Instance {
    pub location: String,
    #[serde(rename = "type")]
    pub inst_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
}

#[derive(Serialize)]
pub struct Setup {
    pub variant: String,
    pub iobanks: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct BitstreamJson {
    pub nets: BTreeMap<String, BTreeSet<String>>,
    pub instances: BTreeMap<String, Instance>,
    pub setup: Setup,
}

/// Instance names can't carry `$`.
pub fn cleanup_name(name: &str) -> String {
    name.replace('$', "_")
}

/// Maps database wire names to the names the configuration format uses for FENCE and
/// TILE switchboxes.
pub fn update_name(tile: &str, name: &str) -> String {
    let tile = strip_tile_type(tile);
    if tile.starts_with("FENCE[") && tile.len() >= 2 {
        let last = tile.as_bytes()[tile.len() - 2];
        if matches!(last, b'T' | b'B' | b'U' | b'L') {
            if let (Some(open), Some(x)) = (tile.find('['), tile.find('x')) {
                if x > open {
                    return name.replace("1x", &tile[open + 1 ..= x]);
                }
            }
        }
    }
    if tile.starts_with("TILE[") && name.contains(".FE") {
        let last = name.rsplit('.').next().unwrap_or("");
        if last.starts_with('D') {
            return name.replace(".D", ".").replace(".FE", ".DFF");
        }
        if last == "L" || last == "R" || last == "CK" {
            return name.replace(".FE", ".DFF");
        }
        if last.starts_with('L') {
            return name.replace(".L", ".").replace(".FE", ".LUT");
        }
        if last.starts_with('P') {
            return name.replace(".PI", ".I").replace(".FE", ".LUT");
        }
    }
    name.to_string()
}

/// Per-instance configuration with typed defaults.
struct Config<'c> {
    cell: &'c CellInfo,
    values: BTreeMap<String, Value>,
}

impl<'c> Config<'c> {
    fn new(cell: &'c CellInfo) -> Self {
        Self { cell, values: BTreeMap::new() }
    }

    fn bool(&mut self, key: &str, def: bool) -> &mut Self {
        self.values.insert(key.to_string(), Value::Bool(self.cell.bool_param_or(key, def)));
        self
    }

    fn int(&mut self, key: &str, def: i64) -> &mut Self {
        self.values.insert(key.to_string(), Value::from(self.cell.int_param_or(key, def)));
        self
    }

    fn str(&mut self, key: &str, def: &str) -> &mut Self {
        self.str_from(key, key, def)
    }

    fn str_from(&mut self, key: &str, param: &str, def: &str) -> &mut Self {
        self.values.insert(key.to_string(), Value::String(self.cell.str_param_or(param, def)));
        self
    }

    fn bits(&mut self, key: &str, bits: usize) -> &mut Self {
        let value = match self.cell.param(key) {
            Some(p) => p.extract_bits_lsb_first(bits),
            None => "0".repeat(bits),
        };
        self.values.insert(key.to_string(), Value::String(value));
        self
    }

    fn finish(&mut self) -> BTreeMap<String, Value> {
        std::mem::take(&mut self.values)
    }
}

struct Writer<'a> {
    uarch: &'a NgUltra,
    ctx: &'a Context,
    instances: BTreeMap<String, Instance>,
    banks: BTreeMap<String, String>,
}

impl<'a> Writer<'a> {
    fn location(&self, bel: BelId, replace: Option<&str>) -> String {
        let mut bel_name = self.ctx.device.bel_name(bel).to_str();
        if let Some(replace) = replace {
            bel_name = bel_name.replace(".FE", replace);
        }
        format!("{}:{}", self.uarch.tile_name(bel.tile), bel_name)
    }

    fn add(&mut self, name: String, location: String, inst_type: String, config: BTreeMap<String, Value>) {
        self.instances.insert(cleanup_name(&name), Instance { location, inst_type, config });
    }

    fn write_nets(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut out = BTreeMap::new();
        for net in self.ctx.netlist.sorted_nets() {
            if net.wires.is_empty() {
                continue;
            }
            out.insert(cleanup_name(&net.name.to_str()), self.net_connections(net));
        }
        out
    }

    fn add_connection(&self, conns: &mut BTreeSet<String>, src_tile: &str, src: &str, src_type: IdString,
                      dst_tile: &str, dst: &str, dst_type: IdString)
    {
        if src_type.in_list(&[ID.LUT_PERMUTATION_WIRE, ID.MUX_WIRE, ID.INTERCONNECT_INPUT]) {
            return;
        }
        let src_type = src_type.to_str();
        if src_type.starts_with("CROSSBAR_") && src_type.ends_with("INPUT_WIRE") {
            return;
        }
        let dst = match dst_type == ID.MUX_WIRE {
            true => dst.rsplit_once('.').map_or(dst, |(head, _)| head),
            false => dst,
        };
        conns.insert(format!("{}:{}->{}:{}",
            src_tile, update_name(src_tile, src), dst_tile, update_name(dst_tile, dst)));
    }

    fn net_connections(&self, net: &NetInfo) -> BTreeSet<String> {
        let dev = &self.ctx.device;
        let mut conns = BTreeSet::new();
        for (wire, pip) in &net.wires {
            match pip {
                Some(pip) => {
                    let swire = dev.pip_src_wire(*pip);
                    let src_orig = dev.pip_src_tile_wire(*pip);
                    let dwire = dev.pip_dst_wire(*pip);
                    let s_tile = self.uarch.tile_name(swire.tile);
                    let tile = self.uarch.tile_name(pip.tile);
                    let src_name = dev.wire_name(swire).to_str();
                    let orig_name = dev.wire_name(src_orig).to_str();

                    /* The node reaching the pip's tile from elsewhere */
                    if orig_name != src_name || swire.tile != src_orig.tile {
                        self.add_connection(&mut conns, s_tile, &src_name, dev.wire_type(swire),
                                            tile, &orig_name, dev.wire_type(src_orig));
                    }
                    let silent = match dev.pip_extra(*pip) {
                        Some(extra) if !extra.name.is_empty() => matches!(extra.kind,
                            PipExtraKind::Bypass | PipExtraKind::Virtual | PipExtraKind::Mux),
                        _ => false,
                    };
                    if !silent {
                        self.add_connection(&mut conns, tile, &orig_name, dev.wire_type(src_orig),
                                            tile, &dev.wire_name(dwire).to_str(), dev.wire_type(dwire));
                    }
                }
                None if net.wires.len() == 1 => {
                    /* Directly connected bel pins */
                    let s_tile = self.uarch.tile_name(wire.tile);
                    let src = dev.wire_name(*wire).to_str();
                    for user in &net.users {
                        let bel = match self.ctx.cell(user.cell).and_then(|c| c.bel) {
                            Some(bel) => bel,
                            None => continue,
                        };
                        let dst = format!("{}.{}", dev.bel_name(bel), user.port);
                        self.add_connection(&mut conns, s_tile, &src, dev.wire_type(*wire),
                                            self.uarch.tile_name(bel.tile), &dst, dev.wire_type(*wire));
                    }
                }
                None => (),
            }
        }
        conns
    }

    fn write_cell(&mut self, cell: &CellInfo, bel: BelId) -> ArchResult<()> {
        let t = cell.cell_type;
        let name = cell.name.to_str();
        let type_name = t.to_str();
        let mut cfg = Config::new(cell);

        if t == ID.BEYOND_FE {
            if cell.bool_param_or("lut_used", false) {
                let config = Config::new(cell).bits("lut_table", 16).finish();
                self.add(name.clone(), self.location(bel, Some(".LUT")), "LUT".into(), config);
            }
            if cell.bool_param_or("dff_used", false) {
                let subtype = cell.str_param_or("type", "DFF");
                if subtype == "DFF" {
                    cfg.values.insert("dff_ctxt".into(),
                        Value::String(cell.int_param_or("dff_ctxt", 0).to_string()));
                    cfg.bool("dff_edge", false).bool("dff_init", false).bool("dff_load", false)
                        .bool("dff_sync", false).bool("dff_type", false);
                }
                self.add(format!("{}_D", name), self.location(bel, Some(".DFF")), subtype, cfg.finish());
            }
            return Ok(());
        }

        if t.in_list(&io_family()) {
            cfg.str("drive", "2mA").str("location", "").str("standard", "LVCMOS");
            let inst = cell.str_param_or("iobname", "");
            let inst = if inst.is_empty() { name } else { inst };
            self.add(inst, self.location(bel, None), type_name, cfg.finish());

            let bank = self.uarch.tiles.bank(bel.tile).to_string();
            if !self.banks.contains_key(&bank) {
                let def = match bank.as_str() {
                    "IOB0" | "IOB1" | "IOB6" | "IOB7" => "3.3V",
                    _ => "1.8V",
                };
                self.banks.insert(bank, def.to_string());
            }
            return Ok(());
        }

        if t == ID.DFR {
            cfg.bool("data_inv", false).bool("dff_edge", false).bool("dff_init", false)
                .bool("dff_load", false).bool("dff_sync", false).bool("dff_type", false)
                .int("mode", 3).str("iobname", "");
        } else if t == ID.BFR {
            cfg.int("mode", 2).str("iobname", "");
            if cell.param("data_inv").is_some() {
                cfg.bool("data_inv", false);
            }
        } else if t == ID.CY {
            cfg.int("add_carry", 0).bool("shifter", false);
        } else if t == ID.XLUT {
            cfg.bits("lut_table", 16);
        } else if t == ID.IOM {
            cfg.str("pads_path", ";;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;");
        } else if t == ID.GCK {
            cfg.bool("inv_in", false).bool("inv_out", false).str("std_mode", "BYPASS");
        } else if t == ID.WFB {
            cfg.bool("delay_on", false).int("delay", 0).bool("wfg_edge", false);
        } else if t == ID.WFG {
            cfg.int("mode", 0).bool("delay_on", false).int("delay", 0).bool("wfg_edge", false)
                .bits("pattern", 16).int("pattern_end", 0).int("div_ratio", 0)
                .bool("div_phase", false).bool("reset_on_pll_lock_n", false)
                .bool("reset_on_pll_locka_n", false).bool("reset_on_cal_lock_n", false);
        } else if t == ID.PLL {
            for key in ["clk_outdiv1", "clk_outdiv2", "clk_outdiv3", "clk_outdiv4",
                        "clk_outdivd1", "clk_outdivd2", "clk_outdivd3", "clk_outdivd4", "clk_outdivd5"] {
                cfg.int(key, 0);
            }
            cfg.bool("use_cal", false).int("clk_cal_sel", 0).int("pll_odf", 0)
                .int("pll_lpf_res", 0).int("pll_lpf_cap", 0).int("cal_div", 0).int("cal_delay", 0)
                .bool("use_pll", true).int("ref_intdiv", 0).bool("ref_osc_on", false)
                .int("pll_cpump", 0).int("pll_lock", 0).bool("ext_fbk_on", false)
                .int("fbk_intdiv", 0).bool("fbk_delay_on", false).int("fbk_delay", 0);
        } else if t.in_list(&[ID.RF, ID.RFSP, ID.XHRF, ID.XWRF, ID.XPRF]) {
            cfg.str_from("context", "mem_ctxt", "").bool("wck_edge", false);
        } else if t == ID.RAM {
            cfg.bool("mcka_edge", false).bool("mckb_edge", false).bool("pcka_edge", false)
                .bool("pckb_edge", false).bits("raw_config0", 4).bits("raw_config1", 16)
                .str_from("context", "mem_ctxt", "");
        } else if t == ID.DSP {
            cfg.bits("raw_config0", 27).bits("raw_config1", 24).bits("raw_config2", 14)
                .bits("raw_config3", 3);
        } else if t.in_list(&[ID.DDE, ID.TDE, ID.CDC, ID.BGC, ID.GBC, ID.XCDC]) {
            self.cdc_config(&mut cfg, t);
        } else if t.in_list(&[ID.FIFO, ID.XHFIFO, ID.XWFIFO]) {
            cfg.bool("rck_edge", false).bool("wck_edge", false);
            if t != ID.FIFO {
                cfg.bool("use_read_arst", false).bool("use_write_arst", false);
            }
            cfg.bits("read_addr_inv", if t == ID.FIFO { 6 } else { 7 });
        } else {
            return Err(ArchError::UnknownCellType { cell: name, cell_type: type_name });
        }
        self.add(name, self.location(bel, None), type_name, cfg.finish());
        Ok(())
    }

    /// BGC and GBC carry no configuration.
    fn cdc_config(&self, cfg: &mut Config, t: IdString) {
        if !t.in_list(&[ID.DDE, ID.TDE, ID.CDC, ID.XCDC]) {
            return;
        }
        let xcdc = t == ID.XCDC;
        cfg.bool("ck0_edge", false).bool("ck1_edge", false).bool("ack_sel", false).bool("bck_sel", false);
        if xcdc {
            cfg.bool("cck_sel", false).bool("dck_sel", false);
        }
        if t != ID.DDE {
            cfg.bool("use_asrc_arst", false).bool("use_bsrc_arst", false);
        }
        if xcdc {
            cfg.bool("use_csrc_arst", false).bool("use_dsrc_arst", false);
        }
        cfg.bool("use_adest_arst", false).bool("use_bdest_arst", false);
        if xcdc {
            cfg.bool("use_cdest_arst", false).bool("use_ddest_arst", false);
        }
        cfg.bool("link_BA", false).bool("link_CB", false).bool("link_DC", false);
    }

    fn write_interconnections(&mut self) {
        let (uarch, ctx) = (self.uarch, self.ctx);
        let dev = &ctx.device;
        for net in ctx.netlist.sorted_nets() {
            let mut pips: Vec<_> = net.wires.values().filter_map(|pip| *pip).collect();
            pips.sort();
            for pip in pips {
                match dev.pip_extra(pip) {
                    Some(extra) if !extra.name.is_empty() && extra.kind == PipExtraKind::Interconnect => (),
                    _ => continue,
                }
                let tile = uarch.tile_name(pip.tile);
                let src = dev.wire_name(dev.pip_src_tile_wire(pip)).to_str();
                let inst_type = if src.starts_with("SO1.") {
                    "OTS"
                } else if src.starts_with("SI1.") {
                    "ITS"
                } else if src.contains("UI1x") {
                    "ITC"
                } else {
                    "OTC"
                };
                let updated = update_name(tile, &src);
                let trimmed = &updated[.. updated.len().saturating_sub(2)];
                let suffix = trimmed.get(4 ..).unwrap_or("");
                let name = format!("{}_{}", net.name, suffix);
                let location = format!("{}:{}", tile, trimmed);
                self.add(name, location, inst_type.to_string(), BTreeMap::new());
            }
        }
    }

    fn write_unused(&mut self) {
        let mut wfgs: Vec<_> = self.uarch.unused_wfg.iter().map(|(b, n)| (*b, *n)).collect();
        wfgs.sort();
        for (bel, name) in wfgs {
            let config: BTreeMap<String, Value> = [
                ("mode", Value::from(0)),
                ("delay_on", Value::Bool(false)),
                ("delay", Value::from(0)),
                ("wfg_edge", Value::Bool(false)),
            ].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
            self.add(name.to_str(), self.location(bel, None), "WFG".into(), config);
        }

        let mut plls: Vec<_> = self.uarch.unused_pll.iter().map(|(b, n)| (*b, *n)).collect();
        plls.sort();
        for (bel, name) in plls {
            let config: BTreeMap<String, Value> = [
                ("use_pll", Value::Bool(false)),
                ("ref_osc_on", Value::Bool(false)),
                ("ext_fbk_on", Value::Bool(false)),
            ].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
            self.add(name.to_str(), self.location(bel, None), "PLL".into(), config);
        }
    }
}

impl NgUltra {
    pub fn bitstream_json(&self, ctx: &Context) -> ArchResult<BitstreamJson> {
        let mut w = Writer {
            uarch: self,
            ctx,
            instances: BTreeMap::new(),
            banks: self.bank_voltage.iter().map(|(b, v)| (b.clone(), v.clone())).collect(),
        };
        let nets = w.write_nets();
        for cell in ctx.netlist.sorted_cells() {
            let bel = match cell.bel {
                Some(bel) => bel,
                None => {
                    log_warn!("cell {} is not placed, it won't be configured", cell.name);
                    continue;
                }
            };
            w.write_cell(cell, bel)?;
        }
        w.write_interconnections();
        w.write_unused();

        Ok(BitstreamJson {
            nets,
            instances: w.instances,
            setup: Setup { variant: "NG-ULTRA".into(), iobanks: w.banks },
        })
    }

    pub fn write_bitstream_json(&self, ctx: &Context, path: &Path) -> ArchResult<()> {
        let json = self.bitstream_json(ctx)?;
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, &json)?;
        out.write_all(b"\n")?;
        out.flush()?;
        log_info!("Wrote {} instances to {}", json.instances.len(), path.display());
        Ok(())
    }
}
