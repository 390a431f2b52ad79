//! Declarative helpers for the typed resource wrappers

/// Declares a typed wrapper over a `ResourceNode` with the chaining operations
/// every resource shares. Collections additionally get `filter`, `order_by`,
/// `top` and `skip`.
///
/// ```ignore
/// resource!(
///     /// A list
///     List
/// );
/// resource!(
///     /// The lists of a web
///     Lists, collection
/// );
/// ```
macro_rules! resource {
    ($(#[$meta:meta])* $name:ident, collection) => {
        resource!($(#[$meta])* $name);

        impl $name {
            pub fn filter(&self, expr: impl Into<String>) -> Result<Self, spchain_core::SpError> {
                self.0.filter(expr).map($name)
            }

            pub fn order_by(&self, field: impl Into<String>, ascending: bool) -> Result<Self, spchain_core::SpError> {
                let field = if ascending {
                    spchain_core::OrderField::asc(field)
                } else {
                    spchain_core::OrderField::desc(field)
                };
                self.0.order_by(vec![field]).map($name)
            }

            pub fn top(&self, n: u32) -> Result<Self, spchain_core::SpError> {
                self.0.top(n).map($name)
            }

            pub fn skip(&self, n: u32) -> Result<Self, spchain_core::SpError> {
                self.0.skip(n).map($name)
            }
        }
    };
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(spchain_core::ResourceNode);

        impl $name {
            pub fn from_node(node: spchain_core::ResourceNode) -> Self {
                $name(node)
            }

            pub fn node(&self) -> &spchain_core::ResourceNode {
                &self.0
            }

            /// Copy whose operations join `batch` instead of running immediately.
            pub fn in_batch(&self, batch: &spchain_core::Batch) -> Self {
                $name(self.0.in_batch(batch))
            }

            /// Copy whose operations run immediately again.
            pub fn unbatched(&self) -> Self {
                $name(self.0.unbatched())
            }

            pub fn select<I, S>(&self, fields: I) -> Result<Self, spchain_core::SpError>
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.0.select(fields).map($name)
            }

            pub fn expand<I, S>(&self, paths: I) -> Result<Self, spchain_core::SpError>
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.0.expand(paths).map($name)
            }

            /// Custom query parameter, e.g. an `@alias` value.
            pub fn param(&self, key: impl Into<String>, value: impl Into<String>) -> Result<Self, spchain_core::SpError> {
                self.0.param(key, value).map($name)
            }
        }

        impl From<$name> for spchain_core::ResourceNode {
            fn from(resource: $name) -> Self {
                resource.0
            }
        }
    };
}
