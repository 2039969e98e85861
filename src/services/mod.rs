pub mod criteria;
pub mod normalizer;
pub mod matcher;

pub mod alert_store;
pub mod ledger;
pub mod sink;
pub mod dispatch;

pub mod alerts_service;
pub mod db_init;
pub mod listing_feed;
pub mod feed_monitor;
