//! BRK-Lite Geometry
//!
//! Mesh reconstruction and export for BRK brick-geometry files, using
//! earcutr triangulation and nalgebra for transforms.

pub mod connector;
pub mod error;
pub mod export;
pub mod import;
pub mod mesh;
pub mod reconstruct;
pub mod split;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point2, Point3, Vector2, Vector3};

// Re-export the progress contract so import callers need only this crate
pub use brk_lite_core::{NullProgress, ProgressSink};

pub use connector::{resolve_markers, ResolvedMarker, SceneObject};
pub use error::{Error, Result};
pub use export::{
    export_animation, export_path, write_brk, ExportObject, ExportOptions, MeshSnapshot,
    SmoothingMode,
};
pub use import::{
    import_path, import_source, ConnectorMarker, ImportOptions, ImportResult, ImportSummary,
};
pub use mesh::{Edge, Polygon, RenderableMesh, VertexGroupWeights};
pub use reconstruct::build_mesh;
pub use split::{split_mesh, SplitGroup};
pub use triangulation::{polygon_normal, project_to_2d, tessellate_ngon};
