// SPDX-License-Identifier: MIT

pub mod pets;
pub mod search;
