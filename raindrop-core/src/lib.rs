mod client;
mod raindrop;

pub use client::{ApiErrorClass, RaindropClient, RaindropError};
pub use raindrop::{
    Collection, CollectionRef, CreatedRaindrops, NewRaindrop, PleaseParse, Raindrop, RaindropPage,
};
pub use reqwest::StatusCode;
