pub mod depth_map;
pub mod frame;
pub mod provenance;
