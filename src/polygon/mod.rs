// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! 2-D polygon engine on fixed-point coordinates (1000 units per mm)

pub mod boolean;
pub mod clean;
pub mod offset;
pub mod path;
pub mod smooth;
pub mod types;

pub use boolean::{merge, merge_paths, outline_groups, union_all, ClipOperation};
pub use clean::{clean_polygons, fix_winding};
pub use offset::{offset, offset_mm, offset_with, JoinStyle, OffsetOptions};
pub use path::{create_polygons, create_vertex_storage, PathCommand, VertexStorage};
pub use smooth::{smooth, smooth_polygons};
pub use types::{IntPoint, Polygon, Polygons, SCALE};
