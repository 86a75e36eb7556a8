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

use clap::Parser;
use std::path::Path;

use nulc::{log_error, log_info, log_warn};
use nulc::chipdb::{self, Device, OpenOpts};
use nulc::context::Context;
use nulc::error::ArchResult;
use nulc::netlist::Netlist;
use nulc::uarch::{ng_ultra::NgUltra, ArchArgs, ArchRegistry, Uarch};

#[derive(Parser, Debug)]
#[clap(
    author = "Antmicro",
    version = "0.1.0",
    about = "NULC - NG-Ultra Legality and Clocking core",
    long_about = None
)]
struct Args {
    #[clap(help = "Chip database")]
    device: String,
    #[clap(help = "Packed netlist (JSON or YAML)")]
    netlist: String,
    #[clap(long, help = "Use raw (uncompressed) chip database")]
    raw: bool,
    #[clap(long, default_value = "ng-ultra", help = "Architecture")]
    uarch: String,
    #[clap(long, help = "I/O and bank configuration records (YAML or JSON)")]
    records: Option<String>,
    #[clap(short = 'o', long = "option", help = "Architecture option, KEY=VALUE")]
    options: Vec<String>,
    #[clap(long, help = "Write the JSON bitstream here")]
    bitstream: Option<String>,
}

fn registry() -> ArchRegistry {
    ArchRegistry::new()
        .register("ng-ultra", NgUltra::create)
}

/// Places every cell that came with a location constraint and reports the ones the
/// architecture rejects.
fn place_constrained(uarch: &mut dyn Uarch, ctx: &mut Context) -> usize {
    let constrained: Vec<_> = ctx.netlist.sorted_cells().iter()
        .filter_map(|c| c.constr_bel.map(|bel| (c.name, c.cell_type, bel)))
        .collect();

    let mut invalid = 0;
    for (cell, cell_type, bel) in constrained {
        if ctx.cell(cell).and_then(|c| c.bel) == Some(bel) {
            continue;
        }
        if !uarch.is_valid_bel_for_cell_type(ctx, cell_type, bel) {
            log_warn!("{} can't be placed at its constrained location", cell);
            invalid += 1;
            continue;
        }
        if !uarch.bind_bel(ctx, bel, cell) {
            log_warn!("constrained location of {} is already taken", cell);
            invalid += 1;
        }
    }
    invalid
}

fn run(args: Args) -> ArchResult<()> {
    let arch_args = ArchArgs::from_options(&args.options)?;
    let registry = registry();
    let mut uarch = registry.create(&args.uarch, &arch_args)?;

    let db = chipdb::open(Path::new(&args.device), OpenOpts { raw: args.raw })?;
    log_info!("Loaded chip database {} ({}x{})", db.name, db.width, db.height);
    let device = Device::new(db)?;
    let netlist = Netlist::load(&args.netlist)?;
    let mut ctx = Context::new(device, netlist)?;
    log_info!("Loaded {} cells and {} nets", ctx.netlist.cells.len(), ctx.netlist.nets.len());

    uarch.init(&ctx)?;
    if let Some(records) = &args.records {
        uarch.load_config_records(&mut ctx, Path::new(records))?;
    }

    let mut invalid = place_constrained(uarch.as_mut(), &mut ctx);
    for (bel, _) in ctx.bound_bels() {
        if !uarch.is_bel_location_valid(&ctx, bel, true) {
            invalid += 1;
        }
    }
    if invalid != 0 {
        log_warn!("{} cells are placed illegally", invalid);
    }

    uarch.pre_route(&mut ctx)?;

    if let Some(bitstream) = &args.bitstream {
        uarch.write_bitstream(&ctx, Path::new(bitstream))?;
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        log_error!("{}", e);
        std::process::exit(1);
    }
}
