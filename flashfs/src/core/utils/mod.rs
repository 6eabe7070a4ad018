// SPDX-License-Identifier: MIT

pub mod time_utils;
pub mod volume_utils;
