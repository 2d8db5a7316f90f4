use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

#[derive(Default)]
struct ResourceArgs {
    record_type: Option<String>,
    endpoint: Option<String>,
    relationships: Vec<(String, String)>,
    client_ids: bool,
}

pub fn derive_resource(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let args = match extract_args(&input) {
        Ok(args) => args,
        Err(err) => return err.to_compile_error().into(),
    };

    // Default: snake_case struct name + "s"
    let record_type = args
        .record_type
        .unwrap_or_else(|| format!("{}s", to_snake_case(&name.to_string())));

    let endpoint = args.endpoint.map(|endpoint| quote! { .endpoint(#endpoint) });
    let relationships = args
        .relationships
        .iter()
        .map(|(rel, target)| quote! { .relationship(#rel, #target) });
    let client_ids = args.client_ids.then(|| quote! { .client_ids() });

    let expanded = quote! {
        impl jsonapi_store::Resource for #name {
            const TYPE: &'static str = #record_type;

            fn schema() -> jsonapi_store::Schema {
                jsonapi_store::Schema::new(Self::TYPE)
                    #endpoint
                    #(#relationships)*
                    #client_ids
            }
        }
    };

    TokenStream::from(expanded)
}

fn extract_args(input: &DeriveInput) -> syn::Result<ResourceArgs> {
    let mut args = ResourceArgs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("resource") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("type") {
                let value: LitStr = meta.value()?.parse()?;
                args.record_type = Some(value.value());
            } else if meta.path.is_ident("endpoint") {
                let value: LitStr = meta.value()?.parse()?;
                args.endpoint = Some(value.value());
            } else if meta.path.is_ident("client_ids") {
                args.client_ids = true;
            } else if meta.path.is_ident("relationships") {
                meta.parse_nested_meta(|rel| {
                    let name = rel
                        .path
                        .get_ident()
                        .map(ToString::to_string)
                        .ok_or_else(|| rel.error("expected a relationship name"))?;
                    let target: LitStr = rel.value()?.parse()?;
                    args.relationships.push((name, target.value()));
                    Ok(())
                })?;
            } else {
                return Err(meta.error("unsupported resource attribute"));
            }
            Ok(())
        })?;
    }

    Ok(args)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
