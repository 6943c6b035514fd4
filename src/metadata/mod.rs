//! Static entity descriptors.
//!
//! Entities describe their fields once, as `static` tables, instead of being
//! inspected at runtime. A descriptor names the storage location per backend
//! (table, collection, index), the fields with their per-backend aliases and
//! an optional parent whose fields are inherited.
//!
//! ```rust,ignore
//! const CUSTOMER_FIELDS: &[FieldDescriptor] = &[
//!     FieldDescriptor::new("name", FieldKind::Text).searchable(),
//!     FieldDescriptor::new("email", FieldKind::Keyword).column("email_address"),
//! ];
//!
//! static CUSTOMER: EntityDescriptor = EntityDescriptor::new("Customer")
//!     .table("customers")
//!     .collection("customers")
//!     .index("customers")
//!     .parent(base_entity)
//!     .fields(CUSTOMER_FIELDS);
//! ```

use crate::identity::Identified;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub mod cache;

pub use cache::{FieldIndex, FieldMetadataCache};

/// Lazily resolves a descriptor, which allows descriptors to refer to each other.
pub type DescriptorRef = fn() -> &'static EntityDescriptor;

/// The storage backends a descriptor can be indexed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Backend {
    Relational,
    Document,
    Search,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Relational, Backend::Document, Backend::Search];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Relational => "relational",
            Backend::Document => "document",
            Backend::Search => "search",
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = crate::error::QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|backend| backend.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                crate::error::QueryError::invalid_parameter(
                    "backend",
                    s,
                    Backend::ALL.iter().map(|b| b.name()),
                )
            })
    }
}

/// Cardinality of a relation field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// The declared type of a field.
#[derive(Clone, Copy, Debug)]
pub enum FieldKind {
    Long,
    Integer,
    Float,
    Boolean,
    Date,
    /// Exact-match string.
    Keyword,
    /// Analyzed full-text string. Sorting on a search backend needs its
    /// `.keyword` sub-field.
    Text,
    /// Embedded structure, stored inline.
    Object(DescriptorRef),
    /// Reference to another entity.
    Relation {
        kind: RelationKind,
        target: DescriptorRef,
        /// Relational join column. For `ToOne` it lives on this table and
        /// points at the target's `pk`, for `ToMany` it lives on the target
        /// table and points back at this `pk`.
        join_column: &'static str,
    },
}

impl FieldKind {
    /// The descriptor a path can descend into, if any.
    pub fn target(&self) -> Option<&'static EntityDescriptor> {
        match self {
            FieldKind::Object(target) | FieldKind::Relation { target, .. } => Some(target()),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, FieldKind::Relation { .. })
    }
}

/// A single declared field with its storage aliases.
#[derive(Clone, Copy, Debug)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub column: Option<&'static str>,
    pub document_name: Option<&'static str>,
    pub search_name: Option<&'static str>,
    pub searchable: bool,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        FieldDescriptor {
            name,
            kind,
            column: None,
            document_name: None,
            search_name: None,
            searchable: false,
        }
    }

    /// Relational column name, if it differs from the field name.
    pub const fn column(self, column: &'static str) -> Self {
        FieldDescriptor {
            column: Some(column),
            ..self
        }
    }

    /// Document field name, if it differs from the field name.
    pub const fn document_name(self, name: &'static str) -> Self {
        FieldDescriptor {
            document_name: Some(name),
            ..self
        }
    }

    /// Search index field name, if it differs from the field name.
    pub const fn search_name(self, name: &'static str) -> Self {
        FieldDescriptor {
            search_name: Some(name),
            ..self
        }
    }

    /// Marks the field as a default candidate for free-text search.
    pub const fn searchable(self) -> Self {
        FieldDescriptor {
            searchable: true,
            ..self
        }
    }

    /// The declared alias for the given backend, if any.
    pub fn alias(&self, backend: Backend) -> Option<&'static str> {
        match backend {
            Backend::Relational => self.column,
            Backend::Document => self.document_name,
            Backend::Search => self.search_name,
        }
    }

    /// The name the backend actually stores this field under.
    pub fn storage_name(&self, backend: Backend) -> &'static str {
        self.alias(backend).unwrap_or(self.name)
    }
}

/// Describes an entity type for all backends.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub name: &'static str,
    pub table: Option<&'static str>,
    pub collection: Option<&'static str>,
    pub index: Option<&'static str>,
    /// `(column, value)` identifying this type in a single-table hierarchy.
    pub discriminator: Option<(&'static str, &'static str)>,
    pub parent: Option<DescriptorRef>,
    pub fields: &'static [FieldDescriptor],
}

impl EntityDescriptor {
    pub const fn new(name: &'static str) -> Self {
        EntityDescriptor {
            name,
            table: None,
            collection: None,
            index: None,
            discriminator: None,
            parent: None,
            fields: &[],
        }
    }

    pub const fn table(self, table: &'static str) -> Self {
        EntityDescriptor {
            table: Some(table),
            ..self
        }
    }

    pub const fn collection(self, collection: &'static str) -> Self {
        EntityDescriptor {
            collection: Some(collection),
            ..self
        }
    }

    pub const fn index(self, index: &'static str) -> Self {
        EntityDescriptor {
            index: Some(index),
            ..self
        }
    }

    pub const fn discriminator(self, column: &'static str, value: &'static str) -> Self {
        EntityDescriptor {
            discriminator: Some((column, value)),
            ..self
        }
    }

    pub const fn parent(self, parent: DescriptorRef) -> Self {
        EntityDescriptor {
            parent: Some(parent),
            ..self
        }
    }

    pub const fn fields(self, fields: &'static [FieldDescriptor]) -> Self {
        EntityDescriptor { fields, ..self }
    }

    /// Table name, falling back to the lowercased entity name.
    pub fn table_name(&self) -> String {
        self.table
            .map(str::to_owned)
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    /// Collection name, falling back to the lowercased entity name.
    pub fn collection_name(&self) -> String {
        self.collection
            .map(str::to_owned)
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    /// Index name, falling back to the lowercased entity name.
    pub fn index_name(&self) -> String {
        self.index
            .map(str::to_owned)
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    /// Iterates the own fields first, then each ancestor's, nearest first.
    pub fn all_fields(&self) -> impl Iterator<Item = &'static FieldDescriptor> + '_ {
        let own = self.fields.iter();
        let inherited = std::iter::successors(self.parent.map(|p| p()), |d| d.parent.map(|p| p()))
            .flat_map(|d| d.fields.iter());
        own.chain(inherited)
    }

    /// Names of the fields flagged as default search candidates.
    pub fn searchable_fields(&self) -> Vec<&'static str> {
        self.all_fields()
            .filter(|field| field.searchable)
            .map(|field| field.name)
            .collect()
    }
}

/// An entity type known to the query tools.
pub trait Entity: Identified + Send + Sync + 'static {
    fn descriptor() -> &'static EntityDescriptor;
}

const BASE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("pk", FieldKind::Long),
    FieldDescriptor::new("sk", FieldKind::Keyword),
    FieldDescriptor::new("deleted", FieldKind::Boolean),
    FieldDescriptor::new("archived", FieldKind::Boolean),
    FieldDescriptor::new("createdAt", FieldKind::Date)
        .column("created_at")
        .search_name("created_at"),
    FieldDescriptor::new("updatedAt", FieldKind::Date)
        .column("updated_at")
        .search_name("updated_at"),
];

static BASE_ENTITY: EntityDescriptor = EntityDescriptor::new("BaseEntity").fields(BASE_FIELDS);

/// The fields every entity inherits: identity, soft-delete flags and audit
/// timestamps. Use it as the root of each entity's parent chain.
pub fn base_entity() -> &'static EntityDescriptor {
    &BASE_ENTITY
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A small entity model shared by the tests of all backends.

    use super::*;
    use crate::identity::EntityIdentity;
    use serde::Deserialize;

    const ORDER_FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::new("number", FieldKind::Keyword).searchable(),
        FieldDescriptor::new("note", FieldKind::Text).searchable(),
        FieldDescriptor::new("total", FieldKind::Float).column("total_amount"),
        FieldDescriptor::new("status", FieldKind::Keyword)
            .document_name("state")
            .search_name("state"),
        FieldDescriptor::new(
            "customer",
            FieldKind::Relation {
                kind: RelationKind::ToOne,
                target: customer,
                join_column: "customer_pk",
            },
        ),
        FieldDescriptor::new(
            "lines",
            FieldKind::Relation {
                kind: RelationKind::ToMany,
                target: order_line,
                join_column: "order_pk",
            },
        ),
        FieldDescriptor::new("shipping", FieldKind::Object(address)),
    ];

    static ORDER: EntityDescriptor = EntityDescriptor::new("Order")
        .table("orders")
        .collection("orders")
        .index("orders")
        .discriminator("order_type", "STANDARD")
        .parent(base_entity)
        .fields(ORDER_FIELDS);

    const CUSTOMER_FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::new("name", FieldKind::Text).searchable(),
        FieldDescriptor::new("email", FieldKind::Keyword)
            .column("email_address")
            .searchable(),
        FieldDescriptor::new(
            "orders",
            FieldKind::Relation {
                kind: RelationKind::ToMany,
                target: order,
                join_column: "customer_pk",
            },
        ),
    ];

    static CUSTOMER: EntityDescriptor = EntityDescriptor::new("Customer")
        .table("customers")
        .collection("customers")
        .index("customers")
        .parent(base_entity)
        .fields(CUSTOMER_FIELDS);

    const ORDER_LINE_FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::new("sku", FieldKind::Keyword),
        FieldDescriptor::new("quantity", FieldKind::Integer),
    ];

    static ORDER_LINE: EntityDescriptor = EntityDescriptor::new("OrderLine")
        .table("order_lines")
        .parent(base_entity)
        .fields(ORDER_LINE_FIELDS);

    const ADDRESS_FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::new("city", FieldKind::Text).search_name("town"),
        FieldDescriptor::new("zip", FieldKind::Keyword),
        FieldDescriptor::new("street", FieldKind::Text),
    ];

    static ADDRESS: EntityDescriptor = EntityDescriptor::new("Address").fields(ADDRESS_FIELDS);

    pub fn order() -> &'static EntityDescriptor {
        &ORDER
    }

    pub fn customer() -> &'static EntityDescriptor {
        &CUSTOMER
    }

    pub fn order_line() -> &'static EntityDescriptor {
        &ORDER_LINE
    }

    pub fn address() -> &'static EntityDescriptor {
        &ADDRESS
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Order {
        #[serde(flatten)]
        pub identity: EntityIdentity,
        pub number: String,
    }

    impl Order {
        pub fn new(pk: i64, number: &str) -> Self {
            Order {
                identity: EntityIdentity::new(pk, format!("sk-{pk}")),
                number: number.to_owned(),
            }
        }
    }

    impl Identified for Order {
        fn identity(&self) -> &EntityIdentity {
            &self.identity
        }
    }

    impl Entity for Order {
        fn descriptor() -> &'static EntityDescriptor {
            order()
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Customer {
        #[serde(flatten)]
        pub identity: EntityIdentity,
        pub name: String,
    }

    impl Identified for Customer {
        fn identity(&self) -> &EntityIdentity {
            &self.identity
        }
    }

    impl Entity for Customer {
        fn descriptor() -> &'static EntityDescriptor {
            customer()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn all_fields_walks_parents_after_own_fields() {
        let names: Vec<_> = order().all_fields().map(|f| f.name).collect();
        assert_eq!(names.first(), Some(&"number"));
        assert!(names.ends_with(&["pk", "sk", "deleted", "archived", "createdAt", "updatedAt"]));
    }

    #[test]
    fn storage_names_fall_back_to_field_name() {
        let total = order().fields.iter().find(|f| f.name == "total").unwrap();
        assert_eq!(total.storage_name(Backend::Relational), "total_amount");
        assert_eq!(total.storage_name(Backend::Document), "total");
        assert_eq!(total.storage_name(Backend::Search), "total");
    }

    #[test]
    fn location_names_fall_back_to_lowercased_entity_name() {
        assert_eq!(order_line().table_name(), "order_lines");
        assert_eq!(order_line().collection_name(), "orderline");
        assert_eq!(order().index_name(), "orders");
    }

    #[test]
    fn searchable_fields_are_collected() {
        assert_eq!(customer().searchable_fields(), vec!["name", "email"]);
        assert!(order_line().searchable_fields().is_empty());
    }

    #[test]
    fn relation_targets_resolve() {
        let customer_field = order().fields.iter().find(|f| f.name == "customer").unwrap();
        assert!(customer_field.kind.is_relation());
        assert_eq!(customer_field.kind.target().map(|d| d.name), Some("Customer"));
    }

    #[test]
    fn backends_parse_case_insensitively() {
        assert_eq!("Search".parse::<Backend>().unwrap(), Backend::Search);
        assert!("graph".parse::<Backend>().is_err());
    }
}
