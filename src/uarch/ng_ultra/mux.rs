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

use crate::chipdb::PipExtraKind;
use crate::common::*;
use crate::context::Context;
use crate::strings::IdString;
use super::NgUltra;

impl NgUltra {
    /// Static mux setting feeding `port` of `bel`, decoded from the routing.
    pub fn get_mux_data(&self, ctx: &Context, bel: BelId, port: IdString) -> Option<u8> {
        let wire = ctx.device.bel_pin_wire(bel, port)?;
        self.get_wire_mux_data(ctx, wire)
    }

    /// Mux input selected by the bound pip driving `wire`. `None` when the wire is not
    /// driven through a mux.
    pub fn get_wire_mux_data(&self, ctx: &Context, wire: WireId) -> Option<u8> {
        ctx.device.pips_uphill(wire).iter()
            .filter(|pip| ctx.bound_pip_net(**pip).is_some())
            .find_map(|pip| match ctx.device.pip_extra(*pip) {
                Some(extra) if extra.kind == PipExtraKind::Mux => Some(extra.input),
                _ => None,
            })
    }
}
