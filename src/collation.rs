//! Russian-aware string ordering for table sorting.
//!
//! Byte order puts `ё` after `я` and every capital before every lowercase
//! letter, which is wrong for a Russian-localized table. Comparison goes
//! through the ICU4X collator with the `ru` tailoring: Cyrillic sorts before
//! Latin, `ё` is a secondary variant of `е`, and case only breaks ties.
//!
//! A final code point comparison keeps the order total.

use icu_collator::options::CollatorOptions;
use icu_collator::{Collator, CollatorBorrowed};
use icu_locale_core::locale;
use lazy_static::lazy_static;
use std::cmp::Ordering;

lazy_static! {
    static ref RUSSIAN: Option<CollatorBorrowed<'static>> =
        match Collator::try_new(locale!("ru").into(), CollatorOptions::default()) {
            Ok(collator) => Some(collator),
            Err(err) => {
                log::warn!("Russian collation data unavailable, using code point order: {err}");
                None
            }
        };
}

/// Compare two strings in Russian alphabetical order
///
/// # Arguments
/// * `a` - Left-hand string
/// * `b` - Right-hand string
///
/// # Returns
/// * `Ordering` - Never `Equal` for distinct strings
///
/// # Examples
/// ```
/// use dekanat::collation::compare;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare("Мехмат", "Физфак"), Ordering::Less);
/// assert_eq!(compare("ёж", "жук"), Ordering::Less);
/// ```
pub fn compare(a: &str, b: &str) -> Ordering {
    let collated = match RUSSIAN.as_ref() {
        Some(collator) => collator.compare(a, b),
        None => Ordering::Equal,
    };
    collated.then_with(|| a.cmp(b))
}
