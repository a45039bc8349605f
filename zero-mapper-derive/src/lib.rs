use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input, spanned::Spanned};

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
}

fn field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("from_row") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                attrs.rename = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else {
                Err(meta.error("expected `rename = \"...\"` or `skip`"))
            }
        })?;
    }
    Ok(attrs)
}

/// Derive macro for `FromRow`.
///
/// Columns are matched to fields by name, exactly first and then
/// case-insensitively. Unmatched columns are ignored; fields without a column
/// keep their type's null value.
///
/// # Example
///
/// ```ignore
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     #[from_row(rename = "user_name")]
///     name: String,
///     email: Option<String>,
///     #[from_row(skip)]
///     cached: Vec<u8>,
/// }
/// ```
#[proc_macro_derive(FromRow, attributes(from_row))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_from_row(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_from_row(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "FromRow only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new(input.span(), "FromRow only supports structs")),
    };

    let mut inits = Vec::new();
    let mut members = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;
        let attrs = field_attrs(field)?;
        if attrs.skip {
            inits.push(quote! { #ident: ::core::default::Default::default() });
            continue;
        }
        inits.push(quote! {
            #ident: <#ty as ::zero_mapper::convert::FromValue>::from_null()?
        });
        let column = attrs.rename.unwrap_or_else(|| ident.to_string());
        members.push(quote! {
            .member(::zero_mapper::type_map::Member::new::<#ty>(
                #column,
                |__this, __value| {
                    __this.#ident = <#ty as ::zero_mapper::convert::FromValue>::from_value(__value)?;
                    ::core::result::Result::Ok(())
                },
            ))
        });
    }

    Ok(quote! {
        impl #impl_generics ::zero_mapper::type_map::FromRow for #name #ty_generics #where_clause {
            fn type_map() -> ::zero_mapper::type_map::TypeMap<Self> {
                ::zero_mapper::type_map::Named::<Self>::new()
                    .default_constructor(|| {
                        ::core::result::Result::Ok(Self {
                            #(#inits,)*
                        })
                    })
                    #(#members)*
                    .into()
            }
        }
    })
}

/// Derive macro for database-mapped unit enums.
///
/// Values convert from the integer discriminant or from the variant name,
/// compared case-insensitively. NULL maps to the variant with discriminant
/// zero, or the first variant.
///
/// ```ignore
/// #[derive(DbEnum)]
/// enum Status {
///     Active = 1,
///     Banned = 2,
/// }
/// ```
#[proc_macro_derive(DbEnum)]
pub fn derive_db_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_db_enum(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_db_enum(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "DbEnum does not support generic enums",
        ));
    }
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new(input.span(), "DbEnum only supports enums"));
    };
    if data.variants.is_empty() {
        return Err(syn::Error::new(
            input.span(),
            "DbEnum needs at least one variant",
        ));
    }

    let mut entries = Vec::new();
    let mut arms = Vec::new();
    for (index, variant) in data.variants.iter().enumerate() {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.span(),
                "DbEnum only supports unit variants",
            ));
        }
        let ident = &variant.ident;
        let label = ident.to_string();
        entries.push(quote! {
            ::zero_mapper::convert::EnumVariant {
                name: #label,
                value: #name::#ident as i64,
            }
        });
        arms.push(quote! { #index => ::core::result::Result::Ok(#name::#ident) });
    }

    Ok(quote! {
        impl #name {
            const __ZERO_MAPPER_VARIANTS: &'static [::zero_mapper::convert::EnumVariant] = &[
                #(#entries),*
            ];

            fn __zero_mapper_variant(index: usize) -> ::zero_mapper::error::Result<Self> {
                match index {
                    #(#arms,)*
                    _ => ::core::result::Result::Err(::zero_mapper::error::Error::Conversion(
                        ::std::format!("no variant at index {}", index),
                    )),
                }
            }
        }

        impl ::zero_mapper::convert::FromValue for #name {
            fn type_info() -> ::zero_mapper::convert::TypeInfo {
                ::zero_mapper::convert::TypeInfo::enumeration::<Self>(Self::__ZERO_MAPPER_VARIANTS)
            }

            fn from_value(value: ::zero_mapper::Value) -> ::zero_mapper::error::Result<Self> {
                if value.is_null() {
                    return <Self as ::zero_mapper::convert::FromValue>::from_null();
                }
                let index = ::zero_mapper::convert::enum_index(Self::__ZERO_MAPPER_VARIANTS, &value)?;
                Self::__zero_mapper_variant(index)
            }

            fn from_null() -> ::zero_mapper::error::Result<Self> {
                Self::__zero_mapper_variant(
                    ::zero_mapper::convert::enum_default_index(Self::__ZERO_MAPPER_VARIANTS),
                )
            }
        }

        impl ::zero_mapper::type_map::FromRow for #name {
            fn type_map() -> ::zero_mapper::type_map::TypeMap<Self> {
                ::zero_mapper::type_map::TypeMap::Scalar {
                    info: <Self as ::zero_mapper::convert::FromValue>::type_info(),
                    build: <Self as ::zero_mapper::convert::FromValue>::from_value,
                }
            }
        }
    })
}
