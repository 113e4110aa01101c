// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stud/connector resolver
//!
//! Deferred second pass over queued connector markers: markers reference
//! their parent object by name, and the named object may not exist until
//! every mesh has been registered. Resolution stores a parent-inverse
//! transform so a marker's world position is unchanged by gaining a parent.

use nalgebra::Matrix4;
use tracing::warn;

use crate::import::ConnectorMarker;
use crate::Point3;

/// A host-registered object the resolver can parent markers to.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub world: Matrix4<f64>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, world: Matrix4<f64>) -> Self {
        SceneObject {
            name: name.into(),
            world,
        }
    }
}

/// A marker after the resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMarker {
    pub name: String,
    /// World position, unchanged from the parsed record
    pub position: Point3<f64>,
    /// Resolved parent object name, if the reference matched
    pub parent: Option<String>,
    /// Inverse of the parent's world transform at resolution time
    pub parent_inverse: Option<Matrix4<f64>>,
}

impl ResolvedMarker {
    /// Position in the parent's space; with no parent this is the world
    /// position itself.
    pub fn local_position(&self) -> Point3<f64> {
        match &self.parent_inverse {
            Some(inv) => inv.transform_point(&self.position),
            None => self.position,
        }
    }

    /// World position after the host applies the parent chain; always equal
    /// to the parsed position by construction.
    pub fn world_position(&self, objects: &[SceneObject]) -> Point3<f64> {
        match (&self.parent, &self.parent_inverse) {
            (Some(parent), Some(inv)) => objects
                .iter()
                .find(|o| &o.name == parent)
                .map(|o| o.world.transform_point(&inv.transform_point(&self.position)))
                .unwrap_or(self.position),
            _ => self.position,
        }
    }
}

/// Resolve queued markers against the host's object table.
///
/// A marker whose referenced parent name is not found (exact string match)
/// keeps no parent; that is reported in the returned count, never raised.
pub fn resolve_markers(
    markers: Vec<ConnectorMarker>,
    objects: &[SceneObject],
) -> (Vec<ResolvedMarker>, u32) {
    let mut unresolved = 0u32;
    let resolved = markers
        .into_iter()
        .map(|marker| {
            let mut parent = None;
            let mut parent_inverse = None;
            if let Some(wanted) = marker.parent {
                match objects.iter().find(|o| o.name == wanted) {
                    Some(object) => match object.world.try_inverse() {
                        Some(inv) => {
                            parent = Some(wanted);
                            parent_inverse = Some(inv);
                        }
                        None => {
                            warn!(marker = %marker.name, parent = %wanted,
                                  "parent transform is singular, leaving marker parentless");
                            unresolved += 1;
                        }
                    },
                    None => {
                        warn!(marker = %marker.name, parent = %wanted,
                              "parent object not found, leaving marker parentless");
                        unresolved += 1;
                    }
                }
            }
            ResolvedMarker {
                name: marker.name,
                position: marker.position,
                parent,
                parent_inverse,
            }
        })
        .collect();
    (resolved, unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector3;
    use approx::assert_relative_eq;

    fn marker(parent: Option<&str>) -> ConnectorMarker {
        ConnectorMarker {
            name: "tip".to_string(),
            position: Point3::new(1.0, 2.0, 3.0),
            parent: parent.map(str::to_string),
        }
    }

    #[test]
    fn test_resolve_to_existing_parent() {
        let objects = vec![SceneObject::new(
            "baseplate",
            Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)),
        )];
        let (resolved, unresolved) = resolve_markers(vec![marker(Some("baseplate"))], &objects);
        assert_eq!(unresolved, 0);
        assert_eq!(resolved[0].parent.as_deref(), Some("baseplate"));

        // gaining the parent must not move the marker
        let world = resolved[0].world_position(&objects);
        assert_relative_eq!(world.x, 1.0);
        assert_relative_eq!(world.y, 2.0);
        assert_relative_eq!(world.z, 3.0);
        // local position compensates for the parent transform
        assert_relative_eq!(resolved[0].local_position().x, -4.0);
    }

    #[test]
    fn test_missing_parent_reported_not_fatal() {
        let (resolved, unresolved) = resolve_markers(vec![marker(Some("ghost"))], &[]);
        assert_eq!(unresolved, 1);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].parent, None);
        assert_eq!(resolved[0].position, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_parentless_marker_passes_through() {
        let (resolved, unresolved) = resolve_markers(vec![marker(None)], &[]);
        assert_eq!(unresolved, 0);
        assert_eq!(resolved[0].parent, None);
    }
}
