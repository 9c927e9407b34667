// Generates a ToFromNetworkOrder impl that serializes/deserializes every
// field of a struct, in declaration order.
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataStruct, DeriveInput};

fn get_struct(ast: &DeriveInput) -> &DataStruct {
    if let Data::Struct(struct_token) = &ast.data {
        struct_token
    } else {
        panic!("<{}> is not a struct!", ast.ident);
    }
}

pub fn dns_struct(ast: &DeriveInput) -> TokenStream {
    let struct_token = get_struct(ast);
    let structure_name = &ast.ident;

    let to_method_calls = struct_token.fields.iter().map(|f| {
        let field_name = f.ident.as_ref().unwrap();
        quote! {
            length += ToFromNetworkOrder::to_network_bytes(&self.#field_name, buffer)?;
        }
    });

    let from_method_calls = struct_token.fields.iter().map(|f| {
        let field_name = f.ident.as_ref().unwrap();
        quote! {
            ToFromNetworkOrder::from_network_bytes(&mut self.#field_name, buffer)?;
        }
    });

    let new_code = quote! {
        impl ToFromNetworkOrder for #structure_name {
            fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> crate::error::DNSResult<usize> {
                let mut length = 0usize;
                #( #to_method_calls)*
                Ok(length)
            }

            fn from_network_bytes(&mut self, buffer: &mut std::io::Cursor<&[u8]>) -> crate::error::DNSResult<()> {
                #( #from_method_calls)*
                Ok(())
            }
        }
    };

    TokenStream::from(new_code)
}
