// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::str::FromStr;

use crate::error::Error;

/// SELECT match predicate kind.
///
/// Accepted either typed or through a fixed string alias (`"eq"`, `">="`,
/// `"&&"`, ...). `BitsAllNotSet` has no alias and is reachable only in typed
/// form.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IteratorType {
    #[default]
    Equal = 0,
    ReversedEqual = 1,
    All = 2,
    LessThan = 3,
    LessThanOrEqual = 4,
    GreaterThanOrEqual = 5,
    GreaterThan = 6,
    BitsAllSet = 7,
    BitsAnySet = 8,
    BitsAllNotSet = 9,
    RtreeOverlaps = 10,
    RtreeNeighbor = 11,
}

impl FromStr for IteratorType {
    type Err = Error;

    fn from_str(alias: &str) -> Result<Self, Error> {
        Ok(match alias {
            "eq" | "==" => Self::Equal,
            "reveq" | "==<" => Self::ReversedEqual,
            "all" | "*" => Self::All,
            "lt" | "<" => Self::LessThan,
            "lte" | "<=" => Self::LessThanOrEqual,
            "gte" | ">=" => Self::GreaterThanOrEqual,
            "gt" | ">" => Self::GreaterThan,
            "bitall" | "&=" => Self::BitsAllSet,
            "bitany" | "&" => Self::BitsAnySet,
            "overlaps" | "&&" => Self::RtreeOverlaps,
            "neighbor" | "<->" => Self::RtreeNeighbor,
            other => {
                return Err(Error::BadArgument(format!("unknown iterator alias {other:?}")));
            },
        })
    }
}

impl TryFrom<&str> for IteratorType {
    type Error = Error;

    fn try_from(alias: &str) -> Result<Self, Error> {
        alias.parse()
    }
}
