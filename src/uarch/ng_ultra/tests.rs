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

use crate::chipdb::testutil::ChipBuilder;
use crate::chipdb::{PinDir, PipExtra, PipExtraKind, BEL_FLAG_GLOBAL, WIRE_FLAG_LOWSKEW};
use crate::common::*;
use crate::context::Context;
use crate::error::{ArchError, DbError};
use crate::netlist::{Netlist, PortRef, Property};
use crate::strings::IdString;
use crate::uarch::{ArchArgs, GckSelect, Uarch};
use super::{NgUltra, NgUltraOptions};
use super::bitstream::{cleanup_name, update_name};
use super::clocks::{assign_gcks, ClockRequest, ClockTables, DriverTier, GckConfig, SinkTier, SourceTier};
use super::constids::ID;
use super::legality::{is_cascade_input, is_cascade_output, parse_voltage, Invalid};
use super::records::ConfigRecord;

fn id(s: &str) -> IdString {
    IdString::new(s)
}

/* Fixture bels, see `fixture_chip` */
const GCK0: BelId = BelId { tile: 0, index: 0 };
const GCK1: BelId = BelId { tile: 0, index: 1 };
const WFG0: BelId = BelId { tile: 0, index: 2 };
const T1_FE0: BelId = BelId { tile: 1, index: 0 };
const T1_FE1: BelId = BelId { tile: 1, index: 1 };
const T2_FE0: BelId = BelId { tile: 2, index: 0 };
const T2_FE1: BelId = BelId { tile: 2, index: 1 };
const PAD: BelId = BelId { tile: 3, index: 0 };
const DSP0: BelId = BelId { tile: 4, index: 0 };
const DSP1: BelId = BelId { tile: 5, index: 0 };

fn mux_pip(input: u8) -> Option<PipExtra> {
    Some(PipExtra { name: id("RMUX"), input, kind: PipExtraKind::Mux, bel: None })
}

/// 4x2 grid:
///   row 0: CKG1 (2 GCKs + WFG, lobe 1), TILE[1x1], TILE[2x1] (lobe 1), IOB0
///   row 1: DSP[0] -> DSP[1] cascade, two empty tiles
/// One clock spine runs GCK.SO -> SPINE -> WFG0 (bypass) -> CK_IN of both TILEs.
fn fixture_chip() -> ChipBuilder {
    let mut b = ChipBuilder::new("ng-ultra-test", 4, 2);

    let ckg = b.tile_type("CKG");
    b.bel(ckg, "GCK0", "GCK", 0, &[
        ("SI1", "GCK0.SI1", PinDir::Input),
        ("CMD", "GCK0.CMD", PinDir::Input),
        ("SO", "GCK0.SO", PinDir::Output),
    ]);
    b.bel(ckg, "GCK1", "GCK", 1, &[
        ("SI1", "GCK1.SI1", PinDir::Input),
        ("CMD", "GCK1.CMD", PinDir::Input),
        ("SO", "GCK1.SO", PinDir::Output),
    ]);
    let wfg = b.bel(ckg, "WFG0", "WFG", 2, &[
        ("ZI", "WFG0.ZI", PinDir::Input),
        ("ZO", "WFG0.ZO", PinDir::Output),
    ]);
    for wire in ["GCK0.SO", "GCK1.SO", "SPINE", "WFG0.ZI", "WFG0.ZO"] {
        b.wire_with(ckg, wire, "", WIRE_FLAG_LOWSKEW);
    }
    b.pip(ckg, "GCK0.SO", "SPINE");
    b.pip(ckg, "GCK1.SO", "SPINE");
    b.pip(ckg, "SPINE", "WFG0.ZI");
    b.pip_with(ckg, "WFG0.ZI", "WFG0.ZO", Some(PipExtra {
        name: id("WFG0.BYPASS"),
        input: 0,
        kind: PipExtraKind::Bypass,
        bel: Some(wfg),
    }));

    let logic = b.tile_type("TILE");
    let fe0 = b.bel(logic, "FE0", "BEYOND_FE", 0, &[
        ("CK", "FE0.CK", PinDir::Input),
        ("R", "FE0.R", PinDir::Input),
        ("LO", "FE0.LO", PinDir::Output),
    ]);
    let fe1 = b.bel(logic, "FE1", "BEYOND_FE", 1, &[
        ("CK", "FE1.CK", PinDir::Input),
        ("R", "FE1.R", PinDir::Input),
    ]);
    b.mux_group(logic, &[fe0, fe1], &["R"]);
    b.wire_with(logic, "CK_IN", "", WIRE_FLAG_LOWSKEW);
    b.pip(logic, "CK_IN", "FE0.CK");
    b.pip(logic, "CK_IN", "FE1.CK");
    b.pip_with(logic, "RS0", "FE0.R", mux_pip(0));
    b.pip_with(logic, "RS1", "FE0.R", mux_pip(1));

    let iob = b.tile_type("IOB");
    let pad = b.bel(iob, "IOP0", "IOP", 0, &[
        ("O", "IOP0.O", PinDir::Output),
        ("I", "IOP0.I", PinDir::Input),
    ]);
    b.bel_flags(iob, pad, BEL_FLAG_GLOBAL);

    let dsp = b.tile_type("DSPT");
    b.bel(dsp, "DSP", "DSP", 0, &[
        ("CCO", "DSP.CCO", PinDir::Output),
        ("CCI", "DSP.CCI", PinDir::Input),
    ]);
    b.pip(dsp, "CASC_IN", "DSP.CCI");

    b.place(0, 0, ckg, Some("CKG1"), Some(1));
    b.place(1, 0, logic, Some("TILE[1x1]"), Some(1));
    b.place(2, 0, logic, Some("TILE[2x1]"), Some(1));
    b.place(3, 0, iob, Some("IOB0"), None);
    b.place(0, 1, dsp, Some("DSP[0]"), None);
    b.place(1, 1, dsp, Some("DSP[1]"), None);

    b.node(&[(0, 0, "WFG0.ZO"), (1, 0, "CK_IN"), (2, 0, "CK_IN")]);
    b.node(&[(0, 1, "DSP.CCO"), (1, 1, "CASC_IN")]);
    b.bank_ckg("IOB0", "CKG1", "CKG1");
    b
}

fn setup_with(netlist: Netlist, opts: NgUltraOptions) -> (Context, NgUltra) {
    let ctx = Context::new(fixture_chip().build(), netlist).unwrap();
    let mut uarch = NgUltra::new(opts).unwrap();
    uarch.init(&ctx).unwrap();
    (ctx, uarch)
}

fn setup(netlist: Netlist) -> (Context, NgUltra) {
    setup_with(netlist, NgUltraOptions::default())
}

fn place(netlist: &mut Netlist, name: &str, bel: BelId) {
    netlist.cells.get_mut(&id(name)).unwrap().bel = Some(bel);
}

/// `gck0` and `gck1` drive the tube nets `clk` and `clk2`.
fn clock_netlist(with_second_net: bool) -> Netlist {
    let mut n = Netlist::new();
    n.add_cell("gck0", "GCK");
    n.connect("gck0", "SO", PinDir::Output, "clk");
    for ff in ["ff0", "ff1"] {
        n.add_cell(ff, "BEYOND_FE").set_param("dff_used", Property::Bool(true));
        n.connect(ff, "CK", PinDir::Input, "clk");
    }
    place(&mut n, "gck0", GCK0);
    place(&mut n, "ff0", T1_FE0);
    place(&mut n, "ff1", T2_FE0);
    if with_second_net {
        n.add_cell("gck1", "GCK");
        n.connect("gck1", "SO", PinDir::Output, "clk2");
        n.add_cell("ff2", "BEYOND_FE");
        n.connect("ff2", "CK", PinDir::Input, "clk2");
        place(&mut n, "gck1", GCK1);
        place(&mut n, "ff2", T1_FE1);
    }
    n
}

fn dsp_netlist() -> Netlist {
    let mut n = Netlist::new();
    n.add_cell("d0", "DSP").constr_children.push(id("d1"));
    n.add_cell("d1", "DSP").cluster = Some(id("d0"));
    n.cells.get_mut(&id("d0")).unwrap().cluster = Some(id("d0"));
    n.connect("d0", "CCO", PinDir::Output, "casc");
    n.connect("d1", "CCI", PinDir::Input, "casc");
    n
}

#[test]
fn test_clock_tiers_are_exclusive() {
    let tables = ClockTables::ng_ultra().unwrap();
    assert_eq!(tables.sink_tier(ID.GCK, ID.CMD), Some(SinkTier::Tube));
    assert_eq!(tables.sink_tier(ID.GCK, ID.SI1), Some(SinkTier::Ring));
    assert_eq!(tables.sink_tier(ID.IOM, ID.FCK1), Some(SinkTier::RingOverTile));
    assert_eq!(tables.sink_tier(ID.DSP, ID.CK), Some(SinkTier::Fabric));
    assert_eq!(tables.source_tier(ID.GCK, ID.SO), Some(SourceTier::Tube));
    assert_eq!(tables.source_tier(ID.PLL, ID.OSC), Some(SourceTier::Ring));
    assert_eq!(tables.source_tier(ID.GCK, ID.SI1), None);

    let sinks: &[(SinkTier, &str, &[&str])] = &[
        (SinkTier::Fabric, "BUF", &["CK"]),
        (SinkTier::Ring, "BUF", &["CK"]),
    ];
    assert!(matches!(
        ClockTables::from_entries(sinks, &[]),
        Err(ArchError::ClockTierConflict { .. })
    ));
    let sources: &[(SourceTier, &str, &[&str])] = &[
        (SourceTier::Ring, "BUF", &["O"]),
        (SourceTier::Tube, "BUF", &["O"]),
    ];
    assert!(ClockTables::from_entries(&[], sources).is_err());
}

#[test]
fn test_tube_only_port_is_only_a_tube_sink() {
    let sinks: &[(SinkTier, &str, &[&str])] = &[(SinkTier::Tube, "TUBE_BUFFER", &["CLK"])];
    let tables = ClockTables::from_entries(sinks, &[]).unwrap();
    let uarch = NgUltra::with_clock_tables(NgUltraOptions::default(), tables);

    let mut n = Netlist::new();
    n.add_cell("tb", "TUBE_BUFFER");
    n.connect("tb", "CLK", PinDir::Input, "c");
    let ctx = Context::new(fixture_chip().build(), n).unwrap();

    let pref = PortRef { cell: id("tb"), port: id("CLK") };
    assert!(uarch.is_tube_clock_sink(&ctx, &pref));
    assert!(!uarch.is_fabric_clock_sink(&ctx, &pref));
    assert!(!uarch.is_ring_clock_sink(&ctx, &pref));
    assert!(!uarch.is_ring_over_tile_clock_sink(&ctx, &pref));
    assert!(uarch.is_lowskew_sink(&ctx, &pref));
}

#[test]
fn test_tile_tables() {
    let (ctx, uarch) = setup(Netlist::new());
    assert_eq!(uarch.tile_name(0), "CKG1:CKG");
    assert_eq!(uarch.tile_name_id(3), id("IOB0:IOB"));
    assert_eq!(uarch.tile_name(6), "X2Y1:NULL");
    assert_eq!(uarch.tile_lobe(1), Some(1));
    assert_eq!(uarch.tile_lobe(3), None);
    assert_eq!(uarch.bank_of_tile(3), "IOB0");
    assert!(uarch.tile_extra_data(&ctx, 6).is_none());
    assert!(uarch.tile_extra_data(&ctx, 100).is_none());
    assert_eq!(uarch.tile_extra_data(&ctx, 0).unwrap().lobe, Some(1));
    assert_eq!(uarch.bank_to_ckg.get(&id("IOB0")), Some(&(id("CKG1"), id("CKG1"))));

    let gcks = &uarch.gck_per_lobe[&1];
    assert_eq!(gcks.iter().map(|g| g.bel).collect::<Vec<_>>(), vec![GCK0, GCK1]);
}

#[test]
fn test_gck_outside_lobe_is_fatal() {
    let mut b = fixture_chip();
    b.place(0, 0, 1, Some("CKG1"), None);
    let ctx = Context::new(b.build(), Netlist::new()).unwrap();
    let mut uarch = NgUltra::new(NgUltraOptions::default()).unwrap();
    assert!(matches!(uarch.init(&ctx), Err(ArchError::MissingTileData { tile: 0, .. })));
}

#[test]
fn test_buckets() {
    let (ctx, uarch) = setup(Netlist::new());
    assert_eq!(uarch.get_bel_bucket_for_cell_type(ID.OTP), ID.IOP);
    assert_eq!(uarch.get_bel_bucket_for_cell_type(ID.XCDC), ID.CDC);
    assert_eq!(uarch.get_bel_bucket_for_cell_type(ID.XWFIFO), ID.FIFO);
    assert_eq!(uarch.get_bel_bucket_for_cell_type(ID.XPRF), ID.RF);
    assert_eq!(uarch.get_bel_bucket_for_cell_type(ID.XLUT), ID.XLUT);

    assert!(uarch.is_valid_bel_for_cell_type(&ctx, ID.IP, PAD));
    assert!(!uarch.is_valid_bel_for_cell_type(&ctx, ID.BEYOND_FE, PAD));
    assert!(uarch.is_valid_bel_for_cell_type(&ctx, ID.WFG, WFG0));
}

#[test]
fn test_hidden_bels_are_never_valid() {
    let mut b = fixture_chip();
    b.bel_flags(2, 0, crate::chipdb::BEL_FLAG_HIDDEN);
    let ctx = Context::new(b.build(), Netlist::new()).unwrap();
    let mut uarch = NgUltra::new(NgUltraOptions::default()).unwrap();
    uarch.init(&ctx).unwrap();
    assert!(!uarch.is_valid_bel_for_cell_type(&ctx, ID.BEYOND_FE, T1_FE0));
}

#[test]
fn test_global_pads_drive_the_ring() {
    let mut n = Netlist::new();
    n.add_cell("pad", "IP");
    n.connect("pad", "O", PinDir::Output, "ext_clk");
    place(&mut n, "pad", PAD);
    n.add_cell("ff", "BEYOND_FE");
    n.connect("ff", "CK", PinDir::Input, "ext_clk");
    let (ctx, uarch) = setup(n);

    let driver = PortRef { cell: id("pad"), port: id("O") };
    assert_eq!(uarch.driver_tier(&ctx, &driver), DriverTier::Ring);
    let user = PortRef { cell: id("ff"), port: id("CK") };
    assert_eq!(uarch.driver_tier(&ctx, &user), DriverTier::Fabric);
}

#[test]
fn test_dsp_cascade_cluster() {
    let (ctx, uarch) = setup(dsp_netlist());
    assert_eq!(uarch.dsp_cascade.get(&DSP0), Some(&DSP1));
    assert_eq!(uarch.dsp_cascade.len(), 1);

    let placement = uarch.get_cluster_placement(&ctx, id("d0"), DSP0).unwrap();
    assert_eq!(placement, vec![(id("d0"), DSP0), (id("d1"), DSP1)]);
    /* DSP1 feeds nothing */
    assert!(uarch.get_cluster_placement(&ctx, id("d0"), DSP1).is_none());

    assert_eq!(uarch.predict_delay(&ctx, DSP0, id("CCO"), DSP1, id("CCI")), uarch.opts.delay_cascade);
}

#[test]
fn test_dsp_cascade_legality() {
    let mut n = dsp_netlist();
    place(&mut n, "d0", DSP1);
    place(&mut n, "d1", DSP0);
    let (ctx, uarch) = setup(n);
    assert!(!uarch.is_bel_location_valid(&ctx, DSP0, true));
    assert!(!uarch.is_bel_location_valid(&ctx, DSP1, false));

    let d1 = ctx.cell(id("d1")).unwrap();
    let moves = [(id("d0"), DSP0), (id("d1"), DSP1)];
    assert!(uarch.check_cell_at(&ctx, d1, DSP1, &moves).is_ok());
    assert!(matches!(
        uarch.check_cell_at(&ctx, d1, DSP0, &[]),
        Err(Invalid::DspCascade { .. })
    ));
}

#[test]
fn test_relative_cluster_placement() {
    let mut n = Netlist::new();
    n.add_cell("root", "BEYOND_FE").constr_children.push(id("child"));
    let child = n.add_cell("child", "BEYOND_FE");
    child.cluster = Some(id("root"));
    child.constr_x = 1;
    child.constr_z = 1;
    let (ctx, uarch) = setup(n);

    let placement = uarch.get_cluster_placement(&ctx, id("root"), T1_FE0).unwrap();
    assert_eq!(placement, vec![(id("root"), T1_FE0), (id("child"), T2_FE1)]);
    /* The child would land off the device */
    assert!(uarch.get_cluster_placement(&ctx, id("root"), T2_FE0).is_none());
}

#[test]
fn test_absolute_z_root() {
    let mut n = Netlist::new();
    let root = n.add_cell("root", "BEYOND_FE");
    root.constr_abs_z = true;
    root.constr_z = 1;
    let (ctx, uarch) = setup(n);
    let placement = uarch.get_cluster_placement(&ctx, id("root"), T1_FE0).unwrap();
    assert_eq!(placement, vec![(id("root"), T1_FE1)]);
}

#[test]
fn test_child_on_wrong_bel_type_is_rejected() {
    let mut n = Netlist::new();
    n.add_cell("root", "BEYOND_FE").constr_children.push(id("child"));
    n.add_cell("child", "BEYOND_FE").constr_x = 1;
    let (ctx, uarch) = setup(n);

    /* X2Y0 + 1 lands on the IOB pad, which exists but takes no FE */
    let root = ctx.cell(id("root")).unwrap();
    let mut placement = vec![(id("root"), T2_FE0)];
    assert!(!uarch.get_child_placement(&ctx, root, ctx.device.bel_location(T2_FE0), &mut placement));
    assert!(uarch.get_cluster_placement(&ctx, id("root"), T2_FE0).is_none());

    let mut placement = vec![(id("root"), T1_FE0)];
    assert!(uarch.get_child_placement(&ctx, root, ctx.device.bel_location(T1_FE0), &mut placement));
    assert_eq!(placement, vec![(id("root"), T1_FE0), (id("child"), T2_FE0)]);
}

#[test]
fn test_cluster_members_never_share_a_bel() {
    let mut n = Netlist::new();
    n.add_cell("root", "BEYOND_FE").constr_children.push(id("child"));
    n.add_cell("child", "BEYOND_FE");
    let (ctx, uarch) = setup(n);
    assert!(uarch.get_cluster_placement(&ctx, id("root"), T1_FE0).is_none());

    let mut n = Netlist::new();
    let root = n.add_cell("root", "BEYOND_FE");
    root.constr_children.push(id("a"));
    root.constr_children.push(id("b"));
    n.add_cell("a", "BEYOND_FE").constr_z = 1;
    n.add_cell("b", "BEYOND_FE").constr_z = 1;
    let (ctx, uarch) = setup(n);
    let root = ctx.cell(id("root")).unwrap();
    let mut placement = vec![(id("root"), T1_FE0)];
    assert!(!uarch.get_child_placement(&ctx, root, ctx.device.bel_location(T1_FE0), &mut placement));
    assert!(uarch.get_cluster_placement(&ctx, id("root"), T1_FE0).is_none());
}

#[test]
fn test_cluster_member_mux_conflict() {
    let mut n = Netlist::new();
    n.add_cell("root", "BEYOND_FE").constr_children.push(id("child"));
    n.add_cell("child", "BEYOND_FE").constr_z = 1;
    n.connect("root", "R", PinDir::Input, "r0");
    n.connect("child", "R", PinDir::Input, "r1");
    let (ctx, uarch) = setup(n);

    let root = ctx.cell(id("root")).unwrap();
    let mut placement = vec![(id("root"), T1_FE0)];
    assert!(!uarch.get_child_placement(&ctx, root, ctx.device.bel_location(T1_FE0), &mut placement));
    assert!(uarch.get_cluster_placement(&ctx, id("root"), T1_FE0).is_none());
}

#[test]
fn test_cluster_member_clock_capacity() {
    let build = |nets: [&str; 3]| {
        let mut n = Netlist::new();
        let root = n.add_cell("root", "BEYOND_FE");
        root.constr_children.push(id("c1"));
        root.constr_children.push(id("c2"));
        n.add_cell("c1", "BEYOND_FE").constr_z = 1;
        n.add_cell("c2", "BEYOND_FE").constr_x = 1;
        for (cell, net) in ["root", "c1", "c2"].into_iter().zip(nets) {
            n.connect(cell, "CK", PinDir::Input, net);
        }
        setup(n)
    };

    /* Three clocks in a lobe with two GCKs */
    let (ctx, uarch) = build(["ck0", "ck1", "ck2"]);
    assert!(uarch.get_cluster_placement(&ctx, id("root"), T1_FE0).is_none());

    let (ctx, uarch) = build(["ck0", "ck1", "ck0"]);
    let placement = uarch.get_cluster_placement(&ctx, id("root"), T1_FE0).unwrap();
    assert_eq!(placement, vec![(id("root"), T1_FE0), (id("c1"), T1_FE1), (id("c2"), T2_FE0)]);
}

#[test]
fn test_unknown_bels_are_rejected() {
    let mut n = Netlist::new();
    n.add_cell("ff", "BEYOND_FE").bel = Some(BelId::new(1, 7));
    let res = Context::new(fixture_chip().build(), n);
    assert!(matches!(res, Err(DbError::Inconsistent(_))));

    let mut n = Netlist::new();
    n.add_cell("ff", "BEYOND_FE").constr_bel = Some(BelId::new(42, 0));
    assert!(Context::new(fixture_chip().build(), n).is_err());

    let mut n = Netlist::new();
    n.add_cell("a", "BEYOND_FE").bel = Some(T1_FE0);
    n.add_cell("b", "BEYOND_FE").bel = Some(T1_FE0);
    assert!(Context::new(fixture_chip().build(), n).is_err());

    let mut n = Netlist::new();
    n.add_cell("ff", "BEYOND_FE");
    let (mut ctx, uarch) = setup(n);
    let missing = BelId::new(1, 7);
    assert!(!ctx.bind_bel(missing, id("ff")));
    assert!(!uarch.is_bel_location_valid(&ctx, missing, true));
    assert!(!uarch.is_valid_bel_for_cell_type(&ctx, ID.BEYOND_FE, missing));
    assert!(uarch.get_cluster_placement(&ctx, id("ff"), missing).is_none());
}

#[test]
fn test_cascade_port_names() {
    assert!(is_cascade_input(id("CAI12")));
    assert!(is_cascade_input(id("CZI")));
    assert!(!is_cascade_input(id("CAO3")));
    assert!(is_cascade_output(id("CCO")));
    assert!(!is_cascade_output(id("CK")));
}

#[test]
fn test_mux_group_conflict() {
    let mut n = Netlist::new();
    for (ff, net) in [("a", "r0"), ("b", "r1")] {
        n.add_cell(ff, "BEYOND_FE");
        n.connect(ff, "R", PinDir::Input, net);
    }
    place(&mut n, "a", T1_FE0);
    place(&mut n, "b", T1_FE1);
    let (ctx, uarch) = setup(n);
    assert!(!uarch.is_bel_location_valid(&ctx, T1_FE1, true));

    /* Same cells in different tiles share no mux */
    let b = ctx.cell(id("b")).unwrap();
    assert!(uarch.check_cell_at(&ctx, b, T2_FE1, &[(id("b"), T2_FE1)]).is_ok());
    assert!(matches!(
        uarch.check_cell_at(&ctx, b, T1_FE1, &[]),
        Err(Invalid::MuxGroup { .. })
    ));
}

#[test]
fn test_mux_value_conflict() {
    let mut n = Netlist::new();
    n.add_cell("a", "BEYOND_FE").set_param("R_mux", Property::Int(0));
    n.connect("a", "R", PinDir::Input, "r0");
    place(&mut n, "a", T1_FE0);
    let (mut ctx, uarch) = setup(n);
    assert_eq!(uarch.get_mux_data(&ctx, T1_FE0, id("R")), None);
    assert!(uarch.is_bel_location_valid(&ctx, T1_FE0, false));

    /* Pip 3 of the TILE type is RS1 -> FE0.R */
    assert!(ctx.bind_pip(PipId::new(1, 3), id("r0")));
    assert_eq!(uarch.get_mux_data(&ctx, T1_FE0, id("R")), Some(1));
    let a = ctx.cell(id("a")).unwrap();
    assert!(matches!(
        uarch.check_cell_at(&ctx, a, T1_FE0, &[]),
        Err(Invalid::MuxValue { decoded: 1, wanted: 0, .. })
    ));
}

#[test]
fn test_clock_capacity_per_lobe() {
    let mut n = Netlist::new();
    for (ff, net) in [("fa", "a"), ("fb", "b"), ("fc", "c"), ("fd", "a")] {
        n.add_cell(ff, "BEYOND_FE");
        n.connect(ff, "CK", PinDir::Input, net);
    }
    place(&mut n, "fa", T1_FE0);
    place(&mut n, "fb", T1_FE1);
    let (mut ctx, mut uarch) = setup(n);

    let fc = ctx.cell(id("fc")).unwrap();
    assert!(matches!(
        uarch.check_cell_at(&ctx, fc, T2_FE0, &[(id("fc"), T2_FE0)]),
        Err(Invalid::ClockCapacity { lobe: 1, nets: 3, gcks: 2 })
    ));
    let fd = ctx.cell(id("fd")).unwrap();
    assert!(uarch.check_cell_at(&ctx, fd, T2_FE0, &[(id("fd"), T2_FE0)]).is_ok());

    assert!(uarch.bind_bel(&mut ctx, T2_FE0, id("fc")));
    assert!(!uarch.is_bel_location_valid(&ctx, T2_FE0, true));
    assert_eq!(uarch.unbind_bel(&mut ctx, T1_FE1), Some(id("fb")));
    assert!(uarch.is_bel_location_valid(&ctx, T2_FE0, true));
}

#[test]
fn test_gck_selection_policies() {
    let (ctx, _) = setup(Netlist::new());
    let any = crate::chipdb::GckSources::any();
    let configs = vec![
        GckConfig { bel: T2_FE0, sources: any.clone() },
        GckConfig { bel: GCK0, sources: any.clone() },
    ];
    let req = [ClockRequest { net: id("clk"), tier: DriverTier::Fabric, driver: Some(Loc::new(0, 0, 0)) }];
    assert_eq!(assign_gcks(&ctx.device, &configs, &req, GckSelect::FirstFit), Some(vec![0]));
    assert_eq!(assign_gcks(&ctx.device, &configs, &req, GckSelect::Nearest), Some(vec![1]));

    let no_fabric = crate::chipdb::GckSources { ring: true, tube: true, fabric: false };
    let configs = vec![GckConfig { bel: GCK0, sources: no_fabric }];
    assert_eq!(assign_gcks(&ctx.device, &configs, &req, GckSelect::FirstFit), None);
}

#[test]
fn test_lowskew_route_reserves_pips() {
    let (mut ctx, mut uarch) = setup(clock_netlist(false));
    let report = uarch.route_lowskew(&mut ctx).unwrap();
    assert_eq!(report.nets, vec![id("clk")]);
    assert_eq!(report.pips, 5);
    assert_eq!(report.skipped, 0);

    for (pin_bel, pin) in [(T1_FE0, "CK"), (T2_FE0, "CK")] {
        let wire = ctx.device.bel_pin_wire(pin_bel, id(pin)).unwrap();
        assert_eq!(ctx.bound_wire_net(wire), Some(id("clk")));
    }

    let blocked: Vec<_> = uarch.blocked_pips().iter().copied().collect();
    /* The second GCK lost its way onto the spine */
    assert!(blocked.contains(&PipId::new(0, 1)));
    for pip in &blocked {
        assert!(!uarch.check_pip_avail(*pip));
        assert!(!uarch.check_pip_avail_for_net(*pip, id("clk")));
    }
    uarch.reset_blocked_pips();
    assert!(blocked.iter().all(|pip| uarch.check_pip_avail(*pip)));
}

#[test]
fn test_lowskew_bypass_reserves_the_wfg() {
    let (mut ctx, mut uarch) = setup(clock_netlist(false));
    uarch.route_lowskew(&mut ctx).unwrap();
    assert_eq!(uarch.unused_wfg.get(&WFG0), Some(&id("clk$wfg_bypass")));
    assert!(!uarch.is_valid_bel_for_cell_type(&ctx, ID.WFG, WFG0));

    uarch.reset_lowskew(&mut ctx);
    assert!(uarch.unused_wfg.is_empty());
    assert!(uarch.blocked_pips().is_empty());
    let wire = ctx.device.bel_pin_wire(T1_FE0, id("CK")).unwrap();
    assert_eq!(ctx.bound_wire_net(wire), None);
}

#[test]
fn test_lowskew_shared_pip_fails_second_net() {
    let (mut ctx, mut uarch) = setup(clock_netlist(true));
    let err = uarch.route_lowskew(&mut ctx).unwrap_err();
    match err {
        ArchError::NoLowSkewPath { net, sink } => {
            assert_eq!(net, "clk2");
            assert_eq!(sink, "ff2.CK");
        }
        other => panic!("unexpected error {}", other),
    }
    /* The first net kept its reservation */
    assert!(!uarch.check_pip_avail(PipId::new(0, 0)));
    assert_eq!(ctx.bound_pip_net(PipId::new(0, 0)), Some(id("clk")));
}

#[test]
fn test_lowskew_skips_unplaced_sinks() {
    let mut n = clock_netlist(false);
    n.cells.get_mut(&id("ff1")).unwrap().bel = None;
    let (mut ctx, mut uarch) = setup(n);
    let report = uarch.route_lowskew(&mut ctx).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.pips, 4);
}

#[test]
fn test_delay_and_bounding_box() {
    let (ctx, uarch) = setup(Netlist::new());
    let src = ctx.device.bel_pin_wire(GCK0, id("SO")).unwrap();
    let dst = ctx.device.bel_pin_wire(DSP1, id("CCI")).unwrap();
    assert_eq!(uarch.estimate_delay(&ctx, src, src), 0);
    assert!(uarch.estimate_delay(&ctx, src, dst) > uarch.opts.delay_local);

    let bb = uarch.get_route_bounding_box(&ctx, src, dst);
    for wire in [src, dst] {
        let (x, y) = ctx.device.tile_xy(wire.tile);
        assert!(bb.contains(x, y));
    }
    assert!(bb.x0 >= 0 && bb.y0 >= 0 && bb.x1 < 4 && bb.y1 < 2);

    let opts = NgUltraOptions { bbox_margin: 0, ..Default::default() };
    let (ctx, uarch) = setup_with(Netlist::new(), opts);
    let bb = uarch.get_route_bounding_box(&ctx, src, src);
    assert!(bb.contains(0, 0));
}

#[test]
fn test_options_from_args() {
    let args = ArchArgs::from_options(["gck_select=nearest", "lowskew=off", "delay_local=7"]).unwrap();
    let opts = NgUltraOptions::from_args(&args).unwrap();
    assert_eq!(opts.gck_select, GckSelect::Nearest);
    assert!(!opts.lowskew);
    assert_eq!(opts.delay_local, 7);

    let args = ArchArgs::from_options(["routing_effort=3"]).unwrap();
    assert!(matches!(NgUltraOptions::from_args(&args), Err(ArchError::InvalidOption { .. })));
}

#[test]
fn test_pre_route_honours_the_lowskew_option() {
    let args = ArchArgs::from_options(["lowskew=0"]).unwrap();
    let (mut ctx, mut uarch) = setup_with(clock_netlist(true), NgUltraOptions::from_args(&args).unwrap());
    uarch.pre_route(&mut ctx).unwrap();
    assert!(uarch.blocked_pips().is_empty());
}

fn io_netlist(standard: &str) -> Netlist {
    let mut n = Netlist::new();
    let io = n.add_cell("io0", "IOP");
    io.set_param("iobname", Property::Str("led".into()));
    io.set_param("standard", Property::Str(standard.into()));
    n
}

#[test]
fn test_voltage_parsing() {
    assert_eq!(parse_voltage("3.3"), Some("3.3V".to_string()));
    assert_eq!(parse_voltage("1.8V"), Some("1.8V".to_string()));
    assert_eq!(parse_voltage("LVCMOS_2.5V"), Some("2.5V".to_string()));
    assert_eq!(parse_voltage("LVDS"), None);
}

#[test]
fn test_records_constrain_ios() {
    let (mut ctx, mut uarch) = setup(io_netlist("LVCMOS_1.8V"));
    let records: Vec<ConfigRecord> = serde_yaml::from_str(r#"
- kind: bank_voltage
  bank: IOB0
  voltage: "3.3"
- kind: io_location
  iobname: led
  location: IOB0_IOP0
  drive: 4mA
  slew_rate: Fast
"#).unwrap();
    uarch.apply_records(&mut ctx, &records).unwrap();
    assert_eq!(uarch.bank_voltage.get("IOB0").map(|v| v.as_str()), Some("3.3V"));

    let io = ctx.cell(id("io0")).unwrap();
    assert_eq!(io.constr_bel, Some(PAD));
    assert_eq!(io.str_param_or("drive", ""), "4mA");
    assert_eq!(io.str_param_or("slewRate", ""), "Fast");
    assert_eq!(io.str_param_or("location", ""), "IOB0_IOP0");

    /* 1.8V standard in a 3.3V bank */
    assert!(uarch.bind_bel(&mut ctx, PAD, id("io0")));
    assert!(!uarch.is_bel_location_valid(&ctx, PAD, true));
}

#[test]
fn test_records_reject_bad_input() {
    let (mut ctx, mut uarch) = setup(io_netlist("LVCMOS"));
    let unknown: Vec<ConfigRecord> = serde_yaml::from_str(r#"
- kind: io_location
  iobname: led
  location: IOB9_IOP0
"#).unwrap();
    assert!(matches!(
        uarch.apply_records(&mut ctx, &unknown),
        Err(ArchError::UnknownLocation { .. })
    ));

    for bad in [
        "- {kind: bank_voltage, bank: IOB0, voltage: \"4.0V\"}",
        "- {kind: bank_voltage, bank: IOB5, voltage: \"1.8V\"}",
        "- {kind: io_location, iobname: led, location: IOB0_IOP0, drive: 3mA}",
        "- {kind: io_location, iobname: led, location: IOB0_IOP0}\n- {kind: io_location, iobname: x, location: IOB0_IOP0}",
    ] {
        let records: Vec<ConfigRecord> = serde_yaml::from_str(bad).unwrap();
        assert!(matches!(
            uarch.apply_records(&mut ctx, &records),
            Err(ArchError::InvalidRecord(_))
        ), "{}", bad);
    }

    /* Unknown iobnames only warn */
    let missing: Vec<ConfigRecord> = serde_yaml::from_str(
        "- {kind: io_location, iobname: nope, location: IOB0_IOP0}"
    ).unwrap();
    assert!(uarch.apply_records(&mut ctx, &missing).is_ok());
}

#[test]
fn test_bank_voltage_from_placed_ios() {
    let mut n = io_netlist("LVCMOS_1.8V");
    place(&mut n, "io0", PAD);
    let (ctx, uarch) = setup(n);
    assert!(uarch.is_bel_location_valid(&ctx, PAD, false));

    let mut other = crate::netlist::CellInfo::new(id("io1"), ID.IOP);
    other.set_param("voltage", Property::Str("3.3".into()));
    assert!(matches!(uarch.check_cell_at(&ctx, &other, PAD, &[]), Err(Invalid::BankVoltage { .. })));
}

#[test]
fn test_name_mangling() {
    assert_eq!(cleanup_name("clk$wfg_bypass"), "clk_wfg_bypass");
    assert_eq!(update_name("TILE[2x3]:TILE", "S.FE1.DI"), "S.DFF1.I");
    assert_eq!(update_name("TILE[2x3]:TILE", "S.FE1.L1"), "S.LUT1.1");
    assert_eq!(update_name("TILE[2x3]:TILE", "S.FE1.CK"), "S.DFF1.CK");
    assert_eq!(update_name("FENCE[10x2T]:FENCE", "FS.1x3"), "FS.10x3");
    assert_eq!(update_name("CKG1:CKG", "S.FE1.DI"), "S.FE1.DI");
}

#[test]
fn test_bitstream_sections() {
    let mut n = clock_netlist(false);
    let io = n.add_cell("io0", "IOP");
    io.set_param("iobname", Property::Str("led".into()));
    place(&mut n, "io0", PAD);
    n.add_cell("lost", "DFR");

    let (mut ctx, mut uarch) = setup(n);
    uarch.route_lowskew(&mut ctx).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bitstream.json");
    uarch.write_bitstream(&ctx, &path).unwrap();
    let json: serde_json::Value = serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();

    let nets = json["nets"].as_object().unwrap();
    let clk: Vec<_> = nets["clk"].as_array().unwrap().iter().map(|c| c.as_str().unwrap()).collect();
    assert!(clk.contains(&"CKG1:CKG:GCK0.SO->CKG1:CKG:SPINE"));
    /* The WFG bypass is not a switch */
    assert!(!clk.iter().any(|c| c.contains("WFG0.ZI->")));

    let instances = json["instances"].as_object().unwrap();
    assert_eq!(instances["gck0"]["type"], "GCK");
    assert_eq!(instances["gck0"]["location"], "CKG1:CKG:GCK0");
    assert_eq!(instances["ff0_D"]["type"], "DFF");
    assert_eq!(instances["led"]["type"], "IOP");
    assert_eq!(instances["clk_wfg_bypass"]["type"], "WFG");
    assert!(!instances.contains_key("ff0"));
    assert!(!instances.contains_key("lost"));

    assert_eq!(json["setup"]["variant"], "NG-ULTRA");
    assert_eq!(json["setup"]["iobanks"]["IOB0"], "3.3V");
}

#[test]
fn test_bitstream_rejects_unknown_cells() {
    let mut n = Netlist::new();
    n.add_cell("m", "MYSTERY");
    place(&mut n, "m", T1_FE0);
    let (ctx, uarch) = setup(n);
    assert!(matches!(uarch.bitstream_json(&ctx), Err(ArchError::UnknownCellType { .. })));
}
