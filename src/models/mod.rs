pub mod alert;
pub mod listing;
pub mod notification;
pub mod user;

pub use alert::{AlertCriteria, Criteria, YearRange};
pub use listing::{GeoPoint, Listing, RawListing};
pub use notification::{DeadLetter, DedupKey, ListingSummary, NotificationJob};
pub use user::CurrentUser;
