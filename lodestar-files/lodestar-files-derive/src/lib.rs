extern crate proc_macro2;

use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::{Data, DeriveInput, Fields, Ident, Lit, LitStr, Meta, NestedMeta, Type, parse_macro_input, spanned::Spanned};

/// Implements `Parseable` for a struct by reading all named fields in declaration order.
#[proc_macro_derive(Parse)]
pub fn derive_parseable(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    derive_parse_internal(input).into()
}

/// Implements `GraphObject` and `GraphType` for a struct: one match arm per field maps the wire
/// property name to the reader of that field.
///
/// Struct attributes: `#[graph(name = "TypeName", initialize = "method")]`.
/// Field attributes: `rename = "wireName"`, `kind = "path" | "raw" | "struct" | "struct_list" | "unknown"`,
/// `key_by = "field"`, `reader = "path::to::fn"` and `skip`.
#[proc_macro_derive(GraphObject, attributes(graph))]
pub fn derive_graph_object(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    match derive_graph_internal(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

// Inside lodestar-files itself the crate is reachable through `extern crate self as lodestar_files`.
fn files_crate() -> TokenStream {
    match crate_name("lodestar-files") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(#ident)
        }
        Ok(FoundCrate::Itself) | Err(_) => quote!(lodestar_files),
    }
}

// taken from sharnoff/derive-syn-parse: put it into a separate function for testability
pub(crate) fn derive_parse_internal(input: DeriveInput) -> TokenStream {
    let krate = files_crate();

    let ident = input.ident;
    let parse_impl = match input.data {
        Data::Union(_) => panic!("`#[derive(Parse)]` is only available on structs: {}", ident),
        Data::Struct(s) => match s.fields {
            Fields::Named(ref fields) => {
                let recurse = fields.named.iter().map(|f| {
                    let name = &f.ident;
                    let ftype = &f.ty;
                    quote_spanned! {f.span()=>
                        #name: <#ftype as #krate::common::reader::Parseable<#ftype>>::parse(rdr)?,
                    }
                });
                quote! { #(#recurse)* }
            }
            _ => panic!(
                "#[derive(Parse)]` only supports named struct fields at the moment: {}",
                ident
            ),
        },
        Data::Enum(_) => panic!("`#[derive(Parse)]` is only available on structs: {}", ident),
    };

    quote!(
        impl #krate::common::reader::Parseable<#ident> for #ident {
            fn parse(rdr: &mut #krate::common::reader::ByteCursor<'_>) -> Result<#ident, #krate::ParserError> {
                Ok(#ident{
                    #parse_impl
                })
            }
        }
    )
}

#[derive(Default)]
struct TypeOptions {
    name: Option<String>,
    initialize: Option<Ident>,
}

#[derive(Default)]
struct FieldOptions {
    rename: Option<String>,
    kind: Option<LitStr>,
    key_by: Option<String>,
    reader: Option<syn::Path>,
    skip: bool,
}

fn graph_attributes(attrs: &[syn::Attribute]) -> syn::Result<Vec<NestedMeta>> {
    let mut nested = Vec::new();
    for attr in attrs.iter().filter(|attr| attr.path.is_ident("graph")) {
        match attr.parse_meta()? {
            Meta::List(list) => nested.extend(list.nested),
            other => return Err(syn::Error::new(other.span(), "expected #[graph(...)]")),
        }
    }
    Ok(nested)
}

fn string_value(lit: &Lit) -> syn::Result<LitStr> {
    match lit {
        Lit::Str(value) => Ok(value.clone()),
        other => Err(syn::Error::new(other.span(), "expected a string literal")),
    }
}

fn type_options(attrs: &[syn::Attribute]) -> syn::Result<TypeOptions> {
    let mut options = TypeOptions::default();
    for meta in graph_attributes(attrs)? {
        match meta {
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => {
                options.name = Some(string_value(&nv.lit)?.value());
            }
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("initialize") => {
                options.initialize = Some(string_value(&nv.lit)?.parse()?);
            }
            other => return Err(syn::Error::new(other.span(), "unknown graph type attribute")),
        }
    }
    Ok(options)
}

fn field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for meta in graph_attributes(attrs)? {
        match meta {
            NestedMeta::Meta(Meta::Path(path)) if path.is_ident("skip") => options.skip = true,
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("rename") => {
                options.rename = Some(string_value(&nv.lit)?.value());
            }
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("kind") => {
                options.kind = Some(string_value(&nv.lit)?);
            }
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("key_by") => {
                options.key_by = Some(string_value(&nv.lit)?.value());
            }
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("reader") => {
                options.reader = Some(string_value(&nv.lit)?.parse()?);
            }
            other => return Err(syn::Error::new(other.span(), "unknown graph field attribute")),
        }
    }
    Ok(options)
}

fn is_string(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == "String")
            .unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn derive_graph_internal(input: DeriveInput) -> syn::Result<TokenStream> {
    let krate = files_crate();
    let ident = input.ident;
    let options = type_options(&input.attrs)?;
    let type_name = options.name.unwrap_or_else(|| ident.to_string());

    let fields = match input.data {
        Data::Struct(s) => match s.fields {
            Fields::Named(fields) => fields.named,
            Fields::Unit => Default::default(),
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "`#[derive(GraphObject)]` only supports named struct fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                ident.span(),
                "`#[derive(GraphObject)]` is only available on structs",
            ));
        }
    };

    let mut read_arms = Vec::new();
    let mut key_arms = Vec::new();
    for field in fields.iter() {
        let field_options = field_options(&field.attrs)?;
        if field_options.skip {
            continue;
        }

        let name = field.ident.as_ref().expect("named fields have an ident");
        let ty = &field.ty;
        let property = field_options
            .rename
            .clone()
            .unwrap_or_else(|| name.to_string());

        let read = if let Some(reader) = &field_options.reader {
            quote_spanned! {field.span()=> #reader(self, ctx, rdr)? }
        } else if let Some(key) = &field_options.key_by {
            quote_spanned! {field.span()=> ctx.read_keyed_list(rdr, &mut self.#name, #property, #key)? }
        } else {
            match field_options.kind.as_ref().map(|kind| kind.value()).as_deref() {
                Some("path") => quote_spanned! {field.span()=> self.#name = ctx.read_path(rdr)?.into() },
                Some("raw") => quote_spanned! {field.span()=> self.#name = Some(ctx.read_raw_object(rdr)?) },
                Some("struct") => quote_spanned! {field.span()=>
                    self.#name = <#ty as #krate::common::reader::Parseable<#ty>>::parse(rdr)?
                },
                Some("struct_list") => quote_spanned! {field.span()=> self.#name = ctx.read_struct_list(rdr)? },
                Some("unknown") => quote_spanned! {field.span()=>
                    return Err(#krate::ParserError::InvalidReader {
                        property: property.to_string(),
                        reason: "no reader is implemented for this property",
                    })
                },
                // Declared kinds that are fully described by the rust type of the field.
                None | Some("color") | Some("quaternion") | Some("vector") | Some("object") | Some("list") => {
                    quote_spanned! {field.span()=>
                        self.#name = <#ty as #krate::graph::types::GraphValue>::read_value(ctx, rdr)?
                    }
                }
                Some(_) => {
                    let kind = field_options.kind.as_ref().expect("matched Some");
                    return Err(syn::Error::new(kind.span(), "unknown graph property kind"));
                }
            }
        };

        read_arms.push(quote! { #property => { #read; } });

        if is_string(ty) {
            key_arms.push(quote! { #property => Some(self.#name.clone()), });
        }
    }

    let read_body = if read_arms.is_empty() {
        quote! { Ok(false) }
    } else {
        quote! {
            match property {
                #(#read_arms)*
                _ => return Ok(false),
            }
            Ok(true)
        }
    };

    let initialize = options.initialize.map(|method| {
        quote! {
            fn initialize(&mut self) {
                self.#method();
            }
        }
    });

    Ok(quote! {
        impl #krate::graph::types::GraphObject for #ident {
            fn type_name(&self) -> &'static str {
                #type_name
            }

            #[allow(unused_variables, unreachable_code)]
            fn read_property(
                &mut self,
                property: &str,
                ctx: &mut #krate::graph::reader::GraphReader<'_>,
                rdr: &mut #krate::common::reader::ByteCursor<'_>,
            ) -> Result<bool, #krate::ParserError> {
                #read_body
            }

            fn key_field(&self, field: &str) -> Option<String> {
                match field {
                    #(#key_arms)*
                    _ => None,
                }
            }

            #initialize

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }

        impl #krate::graph::types::GraphType for #ident {
            const TYPE_NAME: &'static str = #type_name;
        }
    })
}
