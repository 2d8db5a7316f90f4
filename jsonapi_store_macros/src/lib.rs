mod resource;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Resource)] derive macro
// ============================================================================

/// Derive macro for the `Resource` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Resource)]
/// #[resource(type = "events", endpoint = "event", relationships(images = "images"))]
/// struct Event {
///     id: Option<String>,
///     name: String,
/// }
/// ```
///
/// - `type = "..."` sets the JSON:API type.
///   If omitted, defaults to snake_case struct name + "s".
/// - `endpoint = "..."` sets the URL path segment. Defaults to the type.
/// - `relationships(name = "type", ...)` declares relationship target types.
/// - `client_ids` makes new records get a generated id before their first save.
#[proc_macro_derive(Resource, attributes(resource))]
pub fn derive_resource(input: TokenStream) -> TokenStream {
    resource::derive_resource(input)
}
