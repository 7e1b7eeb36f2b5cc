use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingType {
    FixedPrice,
    Auction,
}

impl std::str::FromStr for ListingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed_price" | "fixed" => Ok(ListingType::FixedPrice),
            "auction" => Ok(ListingType::Auction),
            other => Err(format!("unknown listing type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Active,
    Sold,
    Removed,
    Expired,
}

/// Carbon credits offered for sale, priced per tCO2.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub seller_id: String,
    pub seller_name: String,
    #[serde(default)]
    pub seller_rating: f64,
    pub title: String,
    pub location: String,
    pub listing_type: ListingType,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_per_credit: Decimal,
    pub quantity: f64,
    pub status: ListingStatus,
    #[serde(default)]
    pub auction_ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_type: Option<ListingType>,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub listing_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BidPayload {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PurchasePayload<'a> {
    pub listing_id: &'a str,
    pub quantity: f64,
    pub idempotency_key: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_type_parse() {
        assert_eq!("fixed-price".parse::<ListingType>().unwrap(), ListingType::FixedPrice);
        assert_eq!("AUCTION".parse::<ListingType>().unwrap(), ListingType::Auction);
        assert!("barter".parse::<ListingType>().is_err());
    }

    #[test]
    fn test_listing_wire_shape() {
        let json = r#"{"id":"l-1","sellerId":"s-1","sellerName":"GreenFleet","sellerRating":4.6,
            "title":"Urban EV credits","location":"Hanoi, VN","listingType":"AUCTION",
            "pricePerCredit":18.5,"quantity":12.0,"status":"ACTIVE",
            "auctionEndsAt":"2026-11-01T00:00:00Z"}"#;
        let listing: Listing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.listing_type, ListingType::Auction);
        assert_eq!(listing.price_per_credit, Decimal::new(185, 1));
        assert!(listing.auction_ends_at.is_some());
    }
}
