//! Storefront rules that don't need a database: order status graph, totals,
//! loyalty caps, discount checks and slugs.

/// Declares a fieldless enum stored as text, with `as_str`, `Display` and a
/// case-insensitive `FromStr` that fails with a 400.
macro_rules! str_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok($name::$variant);
                    }
                )+
                Err($crate::error::AppError::BadRequest(format!(
                    "Invalid {}: {s}",
                    stringify!($name)
                )))
            }
        }
    };
}

pub(crate) use str_enum;

pub mod checkout;
pub mod discount;
pub mod loyalty;
pub mod pricing;
pub mod slug;
pub mod status;
