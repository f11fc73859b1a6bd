//! Procedural macros for the docrepo project.
//!
//! `#[derive(Document)]` generates the static registration a domain type
//! provides to its repository: its type name, its identifier type and the
//! indexes to provision on its collection.
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! #[document(name = "DataFrame", id = bson::Uuid)]
//! #[serde(rename_all = "camelCase")]
//! pub struct Frame {
//!     #[document(index)]
//!     pub created_at: i64,
//!     #[document(index(unique))]
//!     #[serde(rename = "source")]
//!     pub source_uid: String,
//! }
//! ```
//!
//! Without `name` the struct identifier is used; without `id` the identifier
//! type is `String`. Index keys follow the serde field names.

#[allow(unused_extern_crates)]
extern crate self as docrepo_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Field, Fields, LitStr, Token, Type,
    meta::ParseNestedMeta,
    parse_macro_input,
    spanned::Spanned,
};

#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_document(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_document(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let container = ContainerAttrs::parse(input)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let type_name = container
        .name
        .map(|name| name.value())
        .unwrap_or_else(|| ident.to_string());
    let id_type = container
        .id
        .map(|ty| quote!(#ty))
        .unwrap_or_else(|| quote!(::std::string::String));

    let mut indexes = Vec::new();

    if let Data::Struct(data) = &input.data {
        if let Fields::Named(fields) = &data.fields {
            for field in &fields.named {
                if let Some(unique) = field_index(field)? {
                    let key = serde_key(field, container.rename_all)?;
                    indexes.push(quote! {
                        ::docrepo::index::IndexDescriptor::new(#key, #unique)
                    });
                }
            }
        }
    }

    Ok(quote! {
        impl #impl_generics ::docrepo::document::Document for #ident #ty_generics #where_clause {
            type Id = #id_type;

            fn type_name() -> &'static str {
                #type_name
            }

            fn indexes() -> ::std::vec::Vec<::docrepo::index::IndexDescriptor> {
                ::std::vec![#(#indexes),*]
            }
        }
    })
}

#[derive(Default)]
struct ContainerAttrs {
    name: Option<LitStr>,
    id: Option<Type>,
    rename_all: Option<RenameRule>,
}

impl ContainerAttrs {
    fn parse(input: &DeriveInput) -> syn::Result<Self> {
        let mut attrs = Self::default();

        for attr in &input.attrs {
            if attr.path().is_ident("document") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("name") {
                        attrs.name = Some(meta.value()?.parse()?);
                        Ok(())
                    } else if meta.path.is_ident("id") {
                        attrs.id = Some(meta.value()?.parse()?);
                        Ok(())
                    } else {
                        Err(meta.error("expected `name` or `id`"))
                    }
                })?;
            } else if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename_all") {
                        let rule = serialized_name(&meta)?;
                        attrs.rename_all = Some(
                            RenameRule::from_str(&rule.value())
                                .ok_or_else(|| syn::Error::new(rule.span(), "unknown rename_all rule"))?,
                        );
                        Ok(())
                    } else {
                        skip_meta(&meta)
                    }
                })?;
            }
        }

        Ok(attrs)
    }
}

/// Returns `Some(unique)` if the field carries `#[document(index)]` or
/// `#[document(index(unique))]`.
fn field_index(field: &Field) -> syn::Result<Option<bool>> {
    let mut index = None;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("document")) {
        attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident("index") {
                return Err(meta.error("expected `index`"));
            }

            let mut unique = false;
            if meta.input.peek(syn::token::Paren) {
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("unique") {
                        unique = true;
                        Ok(())
                    } else {
                        Err(inner.error("expected `unique`"))
                    }
                })?;
            }

            index = Some(unique);
            Ok(())
        })?;
    }

    Ok(index)
}

/// Key the field is stored under once serde has serialized it.
fn serde_key(field: &Field, rename_all: Option<RenameRule>) -> syn::Result<String> {
    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new(field.span(), "indexed fields must be named"))?;
    let mut key = None;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                key = Some(serialized_name(&meta)?.value());
                Ok(())
            } else {
                skip_meta(&meta)
            }
        })?;
    }

    let name = ident.to_string();
    let name = name.strip_prefix("r#").unwrap_or(&name);

    Ok(key.unwrap_or_else(|| match rename_all {
        Some(rule) => rule.apply(name),
        None => name.to_string(),
    }))
}

/// Reads `key = "value"` or the `serialize` half of `key(serialize = "...", deserialize = "...")`.
fn serialized_name(meta: &ParseNestedMeta) -> syn::Result<LitStr> {
    if meta.input.peek(Token![=]) {
        return meta.value()?.parse();
    }

    let mut name = None;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("serialize") {
            name = Some(inner.value()?.parse::<LitStr>()?);
            Ok(())
        } else {
            skip_meta(&inner)
        }
    })?;

    name.ok_or_else(|| meta.error("expected a serialize name"))
}

/// Consumes a serde option this macro does not care about.
fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }

    Ok(())
}

/// The serde `rename_all` rules, applied to snake_case field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn from_str(rule: &str) -> Option<Self> {
        Some(match rule {
            "lowercase" => Self::Lower,
            "UPPERCASE" => Self::Upper,
            "PascalCase" => Self::Pascal,
            "camelCase" => Self::Camel,
            "snake_case" => Self::Snake,
            "SCREAMING_SNAKE_CASE" => Self::ScreamingSnake,
            "kebab-case" => Self::Kebab,
            "SCREAMING-KEBAB-CASE" => Self::ScreamingKebab,
            _ => return None,
        })
    }

    fn apply(self, field: &str) -> String {
        match self {
            Self::Lower | Self::Snake => field.to_string(),
            Self::Upper | Self::ScreamingSnake => field.to_ascii_uppercase(),
            Self::Kebab => field.replace('_', "-"),
            Self::ScreamingKebab => field.replace('_', "-").to_ascii_uppercase(),
            Self::Pascal => Self::capitalize_words(field, true),
            Self::Camel => Self::capitalize_words(field, false),
        }
    }

    fn capitalize_words(field: &str, first: bool) -> String {
        let mut out = String::with_capacity(field.len());
        let mut upper = first;

        for ch in field.chars() {
            if ch == '_' {
                upper = true;
            } else if upper {
                out.push(ch.to_ascii_uppercase());
                upper = false;
            } else {
                out.push(ch);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_rename_rules() {
        assert_eq!(RenameRule::Camel.apply("created_at_ms"), "createdAtMs");
        assert_eq!(RenameRule::Pascal.apply("created_at"), "CreatedAt");
        assert_eq!(RenameRule::ScreamingSnake.apply("created_at"), "CREATED_AT");
        assert_eq!(RenameRule::Kebab.apply("created_at"), "created-at");
        assert_eq!(RenameRule::from_str("Title Case"), None);
    }

    #[test]
    fn test_expands_indexes_with_serde_names() {
        let input: DeriveInput = parse_quote! {
            #[document(name = "DataFrame", id = i64)]
            #[serde(rename_all = "camelCase", deny_unknown_fields)]
            struct Frame {
                #[document(index)]
                created_at: i64,
                #[document(index(unique))]
                #[serde(rename = "source", default)]
                source_uid: String,
                #[serde(skip_serializing_if = "Option::is_none")]
                note: Option<String>,
            }
        };

        let expanded = expand_document(&input).unwrap().to_string().replace(' ', "");

        assert!(expanded.contains("\"DataFrame\""));
        assert!(expanded.contains("typeId=i64;"));
        assert!(expanded.contains("IndexDescriptor::new(\"createdAt\",false)"));
        assert!(expanded.contains("IndexDescriptor::new(\"source\",true)"));
        assert!(!expanded.contains("note"));
    }

    #[test]
    fn test_rejects_unknown_document_option() {
        let input: DeriveInput = parse_quote! {
            #[document(collection = "frames")]
            struct Frame {
                name: String,
            }
        };

        assert!(expand_document(&input).is_err());
    }
}
