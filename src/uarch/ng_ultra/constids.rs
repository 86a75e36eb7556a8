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

use crate::strings::IdString;

macro_rules! constids {
    ($($name:ident),* $(,)?) => {
        #[allow(non_snake_case)]
        pub struct ConstIds {
            $( pub $name: IdString, )*
        }

        lazy_static! {
            pub static ref ID: ConstIds = ConstIds {
                $( $name: IdString::new(stringify!($name)), )*
            };
        }
    };
}

constids!(
    /* Cell and bel types */
    BEYOND_FE, IOP, IP, OP, IOTP, ITP, OTP, IOM, DFR, DDFR, BFR, CY, XLUT,
    GCK, WFB, WFG, PLL, RAM, DSP,
    RF, RFSP, XHRF, XWRF, XPRF,
    FIFO, XHFIFO, XWFIFO,
    DDE, TDE, CDC, BGC, GBC, XCDC,
    /* Ports */
    CK, CKF, WCK, RCK, ACK, BCK, CK1, CK2, SI1, SI2, CMD, SO, ZI, ZO,
    REF, FBK, CKO1, CKO2, FCK1, FCK2,
    CLK_O, CLK_DIV1, CLK_DIV2, CLK_DIV3, CLK_DIV4,
    CLK_DIVD1, CLK_DIVD2, CLK_DIVD3, CLK_DIVD4, CLK_DIVD5,
    CLK_CAL, CLK_CAL_DIV, OSC,
    /* Wire types */
    LUT_PERMUTATION_WIRE, MUX_WIRE, INTERCONNECT_INPUT,
);

/// The I/O primitive family, sharing one bucket and the bank voltage rules.
pub fn io_family() -> [IdString; 6] {
    [ID.IOP, ID.IP, ID.OP, ID.IOTP, ID.ITP, ID.OTP]
}
