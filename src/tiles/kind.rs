use geo::{BoundingRect, Centroid};
use geo_types::{Geometry, Point};

use super::encode::PropertyValue;
use crate::registry::{DerivedColumn, QueryKind};

#[derive(Debug, Clone, PartialEq)]
pub struct Projected {
    pub geometry: Geometry<f64>,
    pub derived: Vec<(DerivedColumn, PropertyValue)>,
}

pub fn project(kind: &QueryKind, geometry: Geometry<f64>) -> Option<Projected> {
    match kind {
        QueryKind::Plain | QueryKind::Static { .. } => Some(Projected {
            geometry,
            derived: Vec::new(),
        }),
        QueryKind::Region => region(geometry),
        QueryKind::Label => label(&geometry),
        QueryKind::Cluster => cluster(&geometry),
    }
}

fn region(geometry: Geometry<f64>) -> Option<Projected> {
    let envelope = geometry.bounding_rect()?.to_polygon();
    let bbox = serde_json::to_string(&geojson::Geometry::new(geojson::Value::from(&envelope))).ok()?;
    Some(Projected {
        geometry,
        derived: vec![(DerivedColumn::Bbox, PropertyValue::Text(bbox))],
    })
}

fn label(geometry: &Geometry<f64>) -> Option<Projected> {
    let centroid: Point<f64> = geometry.centroid()?;
    Some(Projected {
        geometry: Geometry::Point(centroid),
        derived: Vec::new(),
    })
}

fn cluster(geometry: &Geometry<f64>) -> Option<Projected> {
    let centroid: Point<f64> = geometry.centroid()?;
    Some(Projected {
        geometry: Geometry::Point(centroid),
        derived: vec![
            (DerivedColumn::Lat, PropertyValue::Double(centroid.y())),
            (DerivedColumn::Lon, PropertyValue::Double(centroid.x())),
        ],
    })
}
