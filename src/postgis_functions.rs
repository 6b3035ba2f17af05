//! PostGIS SQL function bindings for use with Diesel's query builder.
//!
//! `schema.rs` keeps `lat`/`lon` as plain doubles rather than a stored
//! geometry column, so these build ad-hoc points with `ST_MakePoint` /
//! `ST_SetSRID` at query time for the geo-index path in `device_directory`.

#![allow(non_snake_case)]

use diesel::sql_types::{Double, Integer};
use postgis_diesel::sql_types::Geometry;

diesel::define_sql_function! {
    /// Returns true if geometries are within the specified distance (meters
    /// for geography casts) of one another.
    fn ST_DWithin(a: Geometry, b: Geometry, distance: Double) -> Bool;
}

diesel::define_sql_function! {
    /// 2D Cartesian (or geography, when cast) distance between two geometries.
    fn ST_Distance(a: Geometry, b: Geometry) -> Double;
}

diesel::define_sql_function! {
    fn ST_MakePoint(x: Double, y: Double) -> Geometry;
}

diesel::define_sql_function! {
    fn ST_SetSRID(geom: Geometry, srid: Integer) -> Geometry;
}
