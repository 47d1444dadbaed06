//! Model configuration: the merged tree and typed per-stage option blocks.

mod options;
mod store;

pub use options::{
    ChdCellOptions, ChdOptions, DisOptions, GridOptions, InitialConditionOptions, MaskArray,
    MaskOptions, MaskPropagation, ModelOptions, OcOptions, PeriodOptions, PropertyOptions,
    RasterRef, SolverOptions, StartingHead, TdisOptions, Values,
};
pub use store::{parse_block, ConfigStore, MODEL_BLOCK, REMAKE_FLAGS};
