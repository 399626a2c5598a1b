use super::CollectionIndexType;
use crate::{commands::ParticleType, msgpack, Value};

/// Secondary index filter of a query [`Statement`](super::Statement).
///
/// ```rust
/// use windpike::query::{CollectionIndexType, Filter};
///
/// let adults = Filter::range("age", 18, 150);
/// let tagged = Filter::contains("tags", "rust", CollectionIndexType::List);
/// let nearby = Filter::within_radius("location", 52.52, 13.405, 1000.0, None);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    bin_name: String,
    collection_index_type: Option<CollectionIndexType>,
    value_type: ParticleType,
    begin: Value,
    end: Value,
}

impl Filter {
    fn new(
        bin_name: &str,
        collection_index_type: Option<CollectionIndexType>,
        begin: Value,
        end: Value,
    ) -> Self {
        Self {
            bin_name: bin_name.to_owned(),
            collection_index_type,
            value_type: begin.particle_type(),
            begin,
            end,
        }
    }

    /// Match records whose integer bin lies within `begin..=end`.
    #[must_use]
    pub fn range(bin_name: &str, begin: i64, end: i64) -> Self {
        Self::new(bin_name, None, Value::Int(begin), Value::Int(end))
    }

    /// Match records whose integer or string bin equals the value.
    #[must_use]
    pub fn equal(bin_name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(bin_name, None, value.clone(), value)
    }

    /// Match records whose list or map bin contains the value, as selected by the collection
    /// type.
    #[must_use]
    pub fn contains(
        bin_name: &str,
        value: impl Into<Value>,
        collection_index_type: CollectionIndexType,
    ) -> Self {
        let value = value.into();
        Self::new(bin_name, Some(collection_index_type), value.clone(), value)
    }

    /// Match records whose list or map bin contains an integer within `begin..=end`.
    #[must_use]
    pub fn contains_range(
        bin_name: &str,
        begin: i64,
        end: i64,
        collection_index_type: CollectionIndexType,
    ) -> Self {
        Self::new(
            bin_name,
            Some(collection_index_type),
            Value::Int(begin),
            Value::Int(end),
        )
    }

    /// Match records whose GeoJSON point lies within the GeoJSON region.
    #[must_use]
    pub fn within_region(
        bin_name: &str,
        region: &str,
        collection_index_type: Option<CollectionIndexType>,
    ) -> Self {
        let region = Value::GeoJson(region.to_owned());
        Self::new(bin_name, collection_index_type, region.clone(), region)
    }

    /// Match records whose GeoJSON point lies within the circle around the coordinates, with the
    /// radius in meters.
    #[must_use]
    pub fn within_radius(
        bin_name: &str,
        lat: f64,
        lng: f64,
        radius: f64,
        collection_index_type: Option<CollectionIndexType>,
    ) -> Self {
        let region =
            format!(r#"{{"type":"AeroCircle","coordinates":[[{lng:.8},{lat:.8}],{radius}]}}"#);
        Self::within_region(bin_name, &region, collection_index_type)
    }

    /// Match records whose GeoJSON region contains the GeoJSON point.
    #[must_use]
    pub fn regions_containing_point(
        bin_name: &str,
        point: &str,
        collection_index_type: Option<CollectionIndexType>,
    ) -> Self {
        Self::within_region(bin_name, point, collection_index_type)
    }

    #[must_use]
    pub fn bin_name(&self) -> &str {
        &self.bin_name
    }

    pub(crate) fn collection_index_type(&self) -> Option<CollectionIndexType> {
        self.collection_index_type
    }

    pub(crate) fn estimate_size(&self) -> usize {
        self.write_to(&mut msgpack::Sink)
    }

    /// Write the index range field content: a filter count of one, the bin name, the value type
    /// and both bounds prefixed with their size.
    pub(crate) fn write_to(&self, w: &mut impl msgpack::Write) -> usize {
        let mut size = w.write_u8(1);
        size += w.write_u8(self.bin_name.len() as u8);
        size += w.write_str(&self.bin_name);
        size += w.write_u8(self.value_type as u8);

        size += w.write_u32(self.begin.estimate_size() as u32);
        size += self.begin.write_to(w);
        size += w.write_u32(self.end.estimate_size() as u32);
        size += self.end.write_to(w);

        size
    }
}
