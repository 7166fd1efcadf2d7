// trackable.rs - Implementation module
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Meta, Type, parse_macro_input, spanned::Spanned};

/// Internal implementation of the Trackable derive macro.
pub(crate) fn derive_trackable_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_trackable_impl(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

/// Fields of the struct, sorted by role.
#[derive(Default)]
struct TrackFields {
    properties: Vec<(Ident, Type)>,
    /// Accessible by name but left out of `tracked_properties`.
    exposed: Vec<(Ident, Type)>,
    id: Option<Ident>,
    parent: Option<Ident>,
}

/// Generates the implementation tokens for the Trackable trait.
fn generate_trackable_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = collect_fields(input)?;
    let aware = is_aware(input)?;

    let tracked: Vec<LitStr> = fields
        .properties
        .iter()
        .map(|(ident, _)| property_name(ident))
        .collect();

    let accessible = fields.properties.iter().chain(&fields.exposed);
    let names: Vec<LitStr> = accessible
        .clone()
        .map(|(ident, _)| property_name(ident))
        .collect();
    let idents: Vec<&Ident> = accessible.clone().map(|(ident, _)| ident).collect();
    let types: Vec<&Type> = accessible.map(|(_, ty)| ty).collect();

    let (parent_lineage, parent_ancestor, parent_read, parent_write, parent_properties) =
        match &fields.parent {
            Some(parent) => (
                quote! { lineage.extend(::stow::Trackable::lineage(&self.#parent)); },
                quote! { ::stow::Trackable::ancestor(&self.#parent, id) },
                quote! { ::stow::Trackable::read_property(&self.#parent, property) },
                quote! { ::stow::Trackable::write_property(&mut self.#parent, property, value) },
                quote! { ::stow::Trackable::tracked_properties(&self.#parent) },
            ),
            None => (
                quote! {},
                quote! { ::std::option::Option::None },
                quote! { ::std::option::Option::None },
                quote! { ::std::option::Option::None },
                quote! { ::std::vec::Vec::new() },
            ),
        };

    let tracking_id = match (&fields.id, &fields.parent) {
        (Some(id), _) => quote! {
            ::std::option::Option::Some(::std::string::ToString::to_string(&self.#id))
        },
        (None, Some(parent)) => quote! { ::stow::Trackable::tracking_id(&self.#parent) },
        (None, None) => quote! { ::std::option::Option::None },
    };

    let tracking_aware = if aware {
        quote! {
            fn tracking_aware(&self) -> ::std::option::Option<&dyn ::stow::TrackingAware> {
                ::std::option::Option::Some(self)
            }
        }
    } else {
        quote! {}
    };

    let expanded = quote! {
        impl #impl_generics ::stow::Trackable for #name #ty_generics #where_clause {
            fn lineage(&self) -> ::std::vec::Vec<::stow::TypeTag> {
                let mut lineage = ::std::vec![::stow::TypeTag::of::<Self>()];
                #parent_lineage
                lineage
            }

            fn ancestor(&self, id: ::std::any::TypeId) -> ::std::option::Option<&dyn ::std::any::Any> {
                if id == ::std::any::TypeId::of::<Self>() {
                    return ::std::option::Option::Some(self);
                }
                #parent_ancestor
            }

            fn read_property(
                &self,
                property: &str,
            ) -> ::std::option::Option<::stow::__private::anyhow::Result<::stow::Value>> {
                match property {
                    #( #names => ::std::option::Option::Some(::stow::Value::encode(&self.#idents)), )*
                    _ => #parent_read,
                }
            }

            #[allow(unused_variables)]
            fn write_property(
                &mut self,
                property: &str,
                value: &::stow::Value,
            ) -> ::std::option::Option<::stow::__private::anyhow::Result<()>> {
                match property {
                    #(
                        #names => ::std::option::Option::Some(
                            value.decode::<#types>().map(|decoded| self.#idents = decoded)
                        ),
                    )*
                    _ => #parent_write,
                }
            }

            fn tracked_properties(&self) -> ::std::vec::Vec<&'static str> {
                let mut properties: ::std::vec::Vec<&'static str> = #parent_properties;
                properties.extend_from_slice(&[#(#tracked),*]);
                properties
            }

            fn tracking_id(&self) -> ::std::option::Option<::std::string::String> {
                #tracking_id
            }

            #tracking_aware
        }
    };

    Ok(expanded)
}

/// Sorts named fields by their `#[track(...)]` attributes.
fn collect_fields(input: &DeriveInput) -> syn::Result<TrackFields> {
    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named,
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "Trackable can only be derived for structs with named fields",
                ));
            }
        },
        Data::Enum(data) => {
            return Err(syn::Error::new(
                data.enum_token.span,
                "Trackable can only be derived for structs",
            ));
        }
        Data::Union(data) => {
            return Err(syn::Error::new(
                data.union_token.span,
                "Trackable can only be derived for structs",
            ));
        }
    };

    let mut fields = TrackFields::default();

    for field in &named.named {
        let Some(ident) = &field.ident else {
            continue;
        };

        for attr in field.attrs.iter().filter(|a| a.path().is_ident("track")) {
            match &attr.meta {
                Meta::Path(_) => fields.properties.push((ident.clone(), field.ty.clone())),
                Meta::List(_) => attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("id") {
                        if fields.id.is_some() {
                            return Err(meta.error("only one field can be the tracking id"));
                        }
                        fields.id = Some(ident.clone());
                        Ok(())
                    } else if meta.path.is_ident("expose") {
                        fields.exposed.push((ident.clone(), field.ty.clone()));
                        Ok(())
                    } else if meta.path.is_ident("parent") {
                        if fields.parent.is_some() {
                            return Err(meta.error("only one field can be the parent"));
                        }
                        fields.parent = Some(ident.clone());
                        Ok(())
                    } else {
                        Err(meta.error("expected `id`, `expose` or `parent`"))
                    }
                })?,
                Meta::NameValue(nv) => {
                    return Err(syn::Error::new(
                        nv.span(),
                        "expected `#[track]` or `#[track(id | expose | parent)]`",
                    ));
                }
            }
        }
    }

    if let Some(parent) = &fields.parent {
        if fields
            .properties
            .iter()
            .chain(&fields.exposed)
            .any(|(ident, _)| ident == parent)
        {
            return Err(syn::Error::new(
                parent.span(),
                "the parent field cannot also be a property",
            ));
        }
    }

    if let Some((ident, _)) = fields
        .exposed
        .iter()
        .find(|(exposed, _)| fields.properties.iter().any(|(ident, _)| ident == exposed))
    {
        return Err(syn::Error::new(
            ident.span(),
            "a field is either `#[track]` or `#[track(expose)]`",
        ));
    }

    Ok(fields)
}

/// Whether the struct carries `#[trackable(aware)]`.
fn is_aware(input: &DeriveInput) -> syn::Result<bool> {
    let mut aware = false;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("trackable")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("aware") {
                aware = true;
                Ok(())
            } else {
                Err(meta.error("expected `aware`"))
            }
        })?;
    }

    Ok(aware)
}

/// Property name of a field, without any raw identifier prefix.
fn property_name(ident: &Ident) -> LitStr {
    let name = ident.to_string();
    let name = name.strip_prefix("r#").unwrap_or(&name);
    LitStr::new(name, ident.span())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_property_name_strips_raw_prefix() {
        let ident: Ident = parse_quote!(r#type);
        assert_eq!(property_name(&ident).value(), "type");
    }

    #[test]
    fn test_collect_fields() {
        let input: DeriveInput = parse_quote! {
            struct Editor {
                #[track(parent)]
                base: Window,
                #[track(id)]
                path: String,
                #[track]
                zoom: f32,
                #[track]
                wrap: bool,
                scratch: Vec<u8>,
            }
        };

        let fields = collect_fields(&input).unwrap();
        let properties: Vec<String> = fields
            .properties
            .iter()
            .map(|(ident, _)| ident.to_string())
            .collect();

        assert_eq!(properties, vec!["zoom", "wrap"]);
        assert_eq!(fields.id.unwrap().to_string(), "path");
        assert_eq!(fields.parent.unwrap().to_string(), "base");
    }

    #[test]
    fn test_exposed_field_is_accessible_but_not_tracked() {
        let input: DeriveInput = parse_quote! {
            struct Editor {
                #[track]
                zoom: f32,
                #[track(expose)]
                recent: Vec<String>,
            }
        };

        let fields = collect_fields(&input).unwrap();
        assert_eq!(fields.properties.len(), 1);
        assert_eq!(fields.exposed[0].0.to_string(), "recent");

        let token_string = generate_trackable_impl(&input).unwrap().to_string();
        assert!(token_string.contains("\"recent\" =>"));
        assert!(token_string.contains("extend_from_slice (& [\"zoom\"])"));
    }

    #[test]
    fn test_second_parent_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Editor {
                #[track(parent)]
                a: Window,
                #[track(parent)]
                b: Panel,
            }
        };

        let err = collect_fields(&input).err().unwrap();
        assert!(err.to_string().contains("only one field can be the parent"));
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Editor {
                #[track(skip)]
                zoom: f32,
            }
        };

        let err = collect_fields(&input).err().unwrap();
        assert!(err.to_string().contains("expected `id`, `expose` or `parent`"));
    }

    #[test]
    fn test_tuple_struct_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Editor(f32);
        };

        assert!(generate_trackable_impl(&input).is_err());
    }

    #[test]
    fn test_enum_is_rejected() {
        let input: DeriveInput = parse_quote! {
            enum Mode { Edit, View }
        };

        let err = generate_trackable_impl(&input).err().unwrap();
        assert!(err.to_string().contains("only be derived for structs"));
    }

    #[test]
    fn test_is_aware() {
        let aware: DeriveInput = parse_quote! {
            #[trackable(aware)]
            struct Editor { zoom: f32 }
        };
        let plain: DeriveInput = parse_quote! {
            struct Editor { zoom: f32 }
        };

        assert!(is_aware(&aware).unwrap());
        assert!(!is_aware(&plain).unwrap());
    }

    #[test]
    fn test_generate_trackable_impl() {
        let input: DeriveInput = parse_quote! {
            #[trackable(aware)]
            struct Editor {
                #[track(parent)]
                base: Window,
                #[track]
                zoom: f32,
            }
        };

        let tokens = generate_trackable_impl(&input).unwrap();
        let token_string = tokens.to_string();

        assert!(token_string.contains("impl :: stow :: Trackable for Editor"));
        assert!(token_string.contains("\"zoom\" =>"));
        assert!(token_string.contains("decode :: < f32 >"));
        assert!(token_string.contains(":: stow :: Trackable :: lineage (& self . base)"));
        assert!(token_string.contains("fn tracking_aware"));
    }

    #[test]
    fn test_generate_without_parent_ends_lineage() {
        let input: DeriveInput = parse_quote! {
            struct Panel {
                #[track]
                width: u32,
            }
        };

        let token_string = generate_trackable_impl(&input).unwrap().to_string();

        assert!(!token_string.contains(":: stow :: Trackable :: lineage"));
        assert!(!token_string.contains("fn tracking_aware"));
    }
}
