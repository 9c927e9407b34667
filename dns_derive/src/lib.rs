//! Derive macros generating `ToFromNetworkOrder` impls for fixed-shape wire
//! structs, and `Default`/`TryFrom`/`FromStr` impls for the wire enums
//! (`QType`, `QClass`, `OpCode`, `ResponseCode`).
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod dns_struct;
use dns_struct::dns_struct;

mod dns_enum;
use dns_enum::dns_enum;

/// Generate `ToFromNetworkOrder` by serializing/deserializing every field,
/// in declaration order.
#[proc_macro_derive(DnsStruct)]
pub fn derive_dns_struct(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    dns_struct(&ast)
}

/// Generate `Default` (first variant), `TryFrom<u8>`, `TryFrom<u16>`, and
/// `FromStr` for a fieldless enum whose variants all carry an integer
/// discriminant.
#[proc_macro_derive(DnsEnum)]
pub fn derive_dns_enum(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    dns_enum(&ast)
}

/// Test-only helper: parse a fragment of Rust source (a struct/enum
/// definition, as a string) into the `syn::DeriveInput` the two macros
/// above consume, without going through the `proc_macro::TokenStream`
/// boundary the real compiler uses.
#[cfg(test)]
fn get_derive_input(s: &str) -> DeriveInput {
    syn::parse_str(s).expect("valid struct/enum fragment")
}
