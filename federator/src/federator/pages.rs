// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Blocks requested per `eth_getLogs` call.
pub const BLOCKS_PER_PAGE: u64 = 1000;

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Splits `[from, to]` into `ceil((to - from) / BLOCKS_PER_PAGE)` pages.
/// Every page spans `BLOCKS_PER_PAGE` blocks except the last, which ends at
/// `to`. Nothing is returned when `from >= to`.
pub fn pages(from: u64, to: u64) -> Vec<BlockRange> {
    if from >= to {
        return vec![];
    }
    let count = (to - from).div_ceil(BLOCKS_PER_PAGE);
    (0..count)
        .map(|page| {
            let start = from + page * BLOCKS_PER_PAGE;
            let end = if page + 1 == count {
                to
            } else {
                start + BLOCKS_PER_PAGE - 1
            };
            BlockRange {
                from: start,
                to: end,
            }
        })
        .collect()
}
