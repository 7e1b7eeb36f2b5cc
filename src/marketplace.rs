//! Client-side narrowing of a fetched page of listings.

use rust_decimal::Decimal;

use crate::models::listing::{Listing, ListingType};

/// Active predicates are the `Some` fields; blank strings count as inactive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub location: Option<String>,
    pub listing_type: Option<ListingType>,
    pub min_seller_rating: Option<f64>,
    pub keyword: Option<String>,
}

impl ListingFilter {
    pub fn is_empty(&self) -> bool {
        self.min_price.is_none()
            && self.max_price.is_none()
            && active_text(&self.location).is_none()
            && self.listing_type.is_none()
            && self.min_seller_rating.is_none()
            && active_text(&self.keyword).is_none()
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(min) = self.min_price {
            if listing.price_per_credit < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if listing.price_per_credit > max {
                return false;
            }
        }
        if let Some(location) = active_text(&self.location) {
            if !contains_ignore_case(&listing.location, &location) {
                return false;
            }
        }
        if let Some(kind) = self.listing_type {
            if listing.listing_type != kind {
                return false;
            }
        }
        if let Some(rating) = self.min_seller_rating {
            if listing.seller_rating < rating {
                return false;
            }
        }
        if let Some(keyword) = active_text(&self.keyword) {
            if !contains_ignore_case(&listing.title, &keyword)
                && !contains_ignore_case(&listing.seller_name, &keyword)
            {
                return false;
            }
        }
        true
    }
}

/// Listings satisfying every active predicate, in input order.
pub fn apply_filters<'a>(listings: &'a [Listing], filter: &ListingFilter) -> Vec<&'a Listing> {
    listings.iter().filter(|l| filter.matches(l)).collect()
}

fn active_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

fn contains_ignore_case(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}
