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

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::chipdb::{PinDir, TileExtra, BEL_FLAG_GLOBAL};
use crate::common::*;
use crate::context::Context;
use crate::error::{ArchError, ArchResult};
use crate::strings::IdString;
use super::{ArchArgs, GckSelect, Uarch};

pub mod constids;
pub mod tiles;
pub mod clocks;
pub mod legality;
pub mod cluster;
pub mod route;
pub mod mux;
pub mod records;
pub mod bitstream;

#[cfg(test)]
mod tests;

use clocks::{build_gck_per_lobe, ClockTables, GckConfig};
use cluster::build_dsp_cascade;
use constids::ID;
use tiles::TileTable;

const KNOWN_OPTIONS: &[&str] = &[
    "gck_select", "bbox_margin", "delay_base", "delay_per_x", "delay_per_y",
    "delay_local", "delay_cascade", "lowskew",
];

#[derive(Clone, Debug)]
pub struct NgUltraOptions {
    pub gck_select: GckSelect,
    /// Tiles added around the snapped routing box
    pub bbox_margin: i32,
    pub delay_base: Delay,
    pub delay_per_x: Delay,
    pub delay_per_y: Delay,
    pub delay_local: Delay,
    pub delay_cascade: Delay,
    /// Reserve ring/tube clock paths before general routing
    pub lowskew: bool,
}

impl Default for NgUltraOptions {
    fn default() -> Self {
        Self {
            gck_select: GckSelect::FirstFit,
            bbox_margin: 8,
            delay_base: 120,
            delay_per_x: 18,
            delay_per_y: 22,
            delay_local: 40,
            delay_cascade: 10,
            lowskew: true,
        }
    }
}

impl NgUltraOptions {
    pub fn from_args(args: &ArchArgs) -> ArchResult<Self> {
        if let Some(key) = args.keys().find(|k| !KNOWN_OPTIONS.contains(k)) {
            return Err(ArchError::InvalidOption {
                key: key.to_string(),
                value: args.get(key).unwrap_or("").to_string(),
                msg: format!("known options are {}", KNOWN_OPTIONS.join(", ")),
            });
        }
        let def = Self::default();
        Ok(Self {
            gck_select: args.parse_or("gck_select", def.gck_select)?,
            bbox_margin: args.parse_or("bbox_margin", def.bbox_margin)?,
            delay_base: args.parse_or("delay_base", def.delay_base)?,
            delay_per_x: args.parse_or("delay_per_x", def.delay_per_x)?,
            delay_per_y: args.parse_or("delay_per_y", def.delay_per_y)?,
            delay_local: args.parse_or("delay_local", def.delay_local)?,
            delay_cascade: args.parse_or("delay_cascade", def.delay_cascade)?,
            lowskew: args.flag_or("lowskew", def.lowskew)?,
        })
    }
}

pub struct NgUltra {
    pub opts: NgUltraOptions,
    pub(crate) tiles: TileTable,
    pub(crate) clocks: ClockTables,

    /// Bank name to (clock source tile, CKG tile)
    pub bank_to_ckg: HashMap<IdString, (IdString, IdString)>,
    pub gck_per_lobe: HashMap<u32, Vec<GckConfig>>,
    pub dsp_cascade: HashMap<BelId, BelId>,
    /// Configured bank voltages
    pub bank_voltage: HashMap<String, String>,
    /// `<bank>_<bel>` names of pad sites
    pub(crate) locations: HashMap<String, BelId>,
    pub(crate) io_banks: HashSet<String>,
    /// Pads with a direct ring connection, and the pin driving it
    pub(crate) global_capable_bels: HashMap<BelId, IdString>,

    pub(crate) blocked_pips: HashSet<PipId>,
    pub(crate) lowskew_wires: Vec<WireId>,
    pub unused_wfg: HashMap<BelId, IdString>,
    pub unused_pll: HashMap<BelId, IdString>,

    /* Occupancy, updated on every bind/unbind */
    pub(crate) lobe_clocks: HashMap<u32, HashMap<IdString, usize>>,
    pub(crate) bank_io_voltages: HashMap<String, HashMap<String, usize>>,
}

impl NgUltra {
    pub fn new(opts: NgUltraOptions) -> ArchResult<Self> {
        Ok(Self::with_clock_tables(opts, ClockTables::ng_ultra()?))
    }

    pub fn with_clock_tables(opts: NgUltraOptions, clocks: ClockTables) -> Self {
        Self {
            opts,
            tiles: TileTable::default(),
            clocks,
            bank_to_ckg: HashMap::new(),
            gck_per_lobe: HashMap::new(),
            dsp_cascade: HashMap::new(),
            bank_voltage: HashMap::new(),
            locations: HashMap::new(),
            io_banks: HashSet::new(),
            global_capable_bels: HashMap::new(),
            blocked_pips: HashSet::new(),
            lowskew_wires: Vec::new(),
            unused_wfg: HashMap::new(),
            unused_pll: HashMap::new(),
            lobe_clocks: HashMap::new(),
            bank_io_voltages: HashMap::new(),
        }
    }

    pub fn create(args: &ArchArgs) -> ArchResult<Box<dyn Uarch>> {
        Ok(Box::new(Self::new(NgUltraOptions::from_args(args)?)?))
    }

    pub fn clock_tables(&self) -> &ClockTables {
        &self.clocks
    }

    pub fn tile_lobe(&self, tile: u32) -> Option<u32> {
        self.tiles.lobe(tile)
    }

    pub fn tile_name(&self, tile: u32) -> &str {
        self.tiles.name(tile)
    }

    pub fn tile_name_id(&self, tile: u32) -> IdString {
        self.tiles.name_id(tile)
    }

    pub fn bank_of_tile(&self, tile: u32) -> &str {
        self.tiles.bank(tile)
    }

    pub fn tile_xy(&self, ctx: &Context, tile: u32) -> (i32, i32) {
        ctx.device.tile_xy(tile)
    }

    pub fn tile_extra_data<'c>(&self, ctx: &'c Context, tile: u32) -> Option<&'c TileExtra> {
        tiles::tile_extra_data(&ctx.device, tile)
    }

    pub fn init_tables(&mut self, ctx: &Context) -> ArchResult<()> {
        let dev = &ctx.device;
        self.tiles = TileTable::new(dev);

        self.bank_to_ckg = dev.db().extra.bank_ckg.iter()
            .map(|b| (b.bank, (b.source_tile, b.ckg_tile)))
            .collect();
        self.gck_per_lobe = build_gck_per_lobe(dev, &self.tiles)?;
        self.dsp_cascade = build_dsp_cascade(dev);

        self.locations.clear();
        self.io_banks.clear();
        self.global_capable_bels.clear();
        for bel in dev.bels() {
            let data = dev.bel_data(bel);
            if self.get_bel_bucket_for_cell_type(data.bel_type) != ID.IOP {
                continue;
            }
            let bank = self.tiles.bank(bel.tile).to_string();
            self.locations.insert(format!("{}_{}", bank, data.name), bel);
            self.io_banks.insert(bank);
            if data.flags & BEL_FLAG_GLOBAL != 0 {
                if let Some(pin) = data.pins.iter().find(|p| p.dir == PinDir::Output) {
                    self.global_capable_bels.insert(bel, pin.name);
                }
            }
        }

        self.lobe_clocks.clear();
        self.bank_io_voltages.clear();
        for (bel, cell) in ctx.bound_bels() {
            self.track_binding(ctx, bel, cell, true);
        }

        log_info!("NG-Ultra: {} lobes with GCKs, {} DSP cascade links, {} I/O sites in {} banks",
            self.gck_per_lobe.len(), self.dsp_cascade.len(), self.locations.len(), self.io_banks.len());
        Ok(())
    }
}

impl Uarch for NgUltra {
    fn name(&self) -> &'static str {
        "ng-ultra"
    }

    fn init(&mut self, ctx: &Context) -> ArchResult<()> {
        self.init_tables(ctx)
    }

    fn is_bel_location_valid(&self, ctx: &Context, bel: BelId, explain_invalid: bool) -> bool {
        NgUltra::is_bel_location_valid(self, ctx, bel, explain_invalid)
    }

    fn get_bel_bucket_for_cell_type(&self, cell_type: IdString) -> IdString {
        NgUltra::get_bel_bucket_for_cell_type(self, cell_type)
    }

    fn is_valid_bel_for_cell_type(&self, ctx: &Context, cell_type: IdString, bel: BelId) -> bool {
        NgUltra::is_valid_bel_for_cell_type(self, ctx, cell_type, bel)
    }

    fn get_cluster_placement(&self, ctx: &Context, cluster: IdString, root_bel: BelId)
        -> Option<Vec<(IdString, BelId)>>
    {
        NgUltra::get_cluster_placement(self, ctx, cluster, root_bel)
    }

    fn check_pip_avail(&self, pip: PipId) -> bool {
        NgUltra::check_pip_avail(self, pip)
    }

    fn get_route_bounding_box(&self, ctx: &Context, src: WireId, dst: WireId) -> BoundingBox {
        NgUltra::get_route_bounding_box(self, ctx, src, dst)
    }

    fn estimate_delay(&self, ctx: &Context, src: WireId, dst: WireId) -> Delay {
        NgUltra::estimate_delay(self, ctx, src, dst)
    }

    fn predict_delay(&self, ctx: &Context, src_bel: BelId, src_pin: IdString,
                     dst_bel: BelId, dst_pin: IdString) -> Delay
    {
        NgUltra::predict_delay(self, ctx, src_bel, src_pin, dst_bel, dst_pin)
    }

    fn notify_bel_change(&mut self, ctx: &Context, bel: BelId, cell: IdString, bound: bool) {
        self.track_binding(ctx, bel, cell, bound);
    }

    fn load_config_records(&mut self, ctx: &mut Context, path: &Path) -> ArchResult<()> {
        self.load_records_file(ctx, path)
    }

    fn pre_route(&mut self, ctx: &mut Context) -> ArchResult<()> {
        if self.opts.lowskew {
            self.route_lowskew(ctx)?;
        }
        Ok(())
    }

    fn write_bitstream(&self, ctx: &Context, path: &Path) -> ArchResult<()> {
        self.write_bitstream_json(ctx, path)
    }
}
