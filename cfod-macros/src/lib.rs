use darling::ast::Data;
use darling::{FromDeriveInput, FromField};
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

use proc_macro::TokenStream;

#[derive(FromField)]
struct HeaderField {
    ident: Option<syn::Ident>,
}

#[derive(FromDeriveInput)]
#[darling(supports(struct_named))]
struct HeaderInput {
    ident: syn::Ident,
    data: Data<(), HeaderField>,
}

/// Derives `crate::filterbank::SigprocHeader` for a struct with named fields.
///
/// Fields are written in declaration order between `HEADER_START` and
/// `HEADER_END`, each as its field name followed by its value. Values must
/// implement `crate::filterbank::SigprocField`.
#[proc_macro_derive(SigprocHeader)]
pub fn derive_sigproc_header(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let input = match HeaderInput::from_derive_input(&input) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.write_errors()),
    };

    let name = &input.ident;
    let fields = input
        .data
        .take_struct()
        .map(|f| f.fields)
        .unwrap_or_default();

    let (members, keys): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .filter_map(|f| {
            let ident = f.ident?;
            let key = ident.to_string();
            Some((ident, key))
        })
        .unzip();

    let expanded = quote! {
        impl crate::filterbank::SigprocHeader for #name {
            fn write_header(&self, dst: &mut Vec<u8>) {
                crate::byteorder::WriteBytesLe::write_le("HEADER_START", dst);
                #( crate::filterbank::SigprocField::write_keyed(&self.#members, #keys, dst); )*
                crate::byteorder::WriteBytesLe::write_le("HEADER_END", dst);
            }
        }
    };

    TokenStream::from(expanded)
}
