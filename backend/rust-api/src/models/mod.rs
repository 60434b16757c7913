pub mod assignment;
pub mod course;
pub mod datetime;
pub mod notification;
pub mod user;
pub mod validation;

use mongodb::bson::{doc, oid::ObjectId, Document};

/// Collection names
pub const USERS: &str = "users";
pub const COURSES: &str = "courses";
pub const ASSIGNMENTS: &str = "assignments";
pub const NOTIFICATIONS: &str = "notifications";

/// Matches `id` only while the embedded array `field` is empty or absent
pub fn empty_array_filter(id: ObjectId, field: &str) -> Document {
    doc! {
        "_id": id,
        "$or": [
            { field: { "$size": 0 } },
            { field: { "$exists": false } },
        ]
    }
}
