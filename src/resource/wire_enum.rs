//! Open API enumerations
//!
//! Enumerated API values are a closed set when they come from configuration,
//! but the server keeps adding values (routine types, languages, type kinds).
//! [`wire_enum!`] declares an enum whose known variants map to their wire
//! names and whose `Other` variant keeps any other value verbatim, so reads
//! never fail on a value this crate doesn't know yet.

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)+
            /// Value outside the known set, as sent by the server
            Other(::std::string::String),
        }

        impl $name {
            /// Known wire names
            pub const KNOWN: &'static [&'static str] = &[$($wire),+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Other(value) => value.as_str(),
                }
            }

            pub fn from_wire(value: &str) -> Self {
                match value {
                    $($wire => Self::$variant,)+
                    other => Self::Other(other.to_string()),
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }

            /// Reject configured values outside the known set
            pub fn validate(&self, field: &str) -> $crate::error::Result<()> {
                match self {
                    Self::Other(value) => Err($crate::error::ProviderError::expand(
                        field,
                        format!("unsupported value {value:?}, expected one of {:?}", Self::KNOWN),
                    )),
                    _ => Ok(()),
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(
                &self,
                serializer: S,
            ) -> ::std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(
                deserializer: D,
            ) -> ::std::result::Result<Self, D::Error> {
                let value = <::std::string::String as ::serde::Deserialize>::deserialize(deserializer)?;
                Ok(Self::from_wire(&value))
            }
        }
    };
}

pub(crate) use wire_enum;
