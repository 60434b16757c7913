use validator::ValidationError;

pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

pub fn object_id(value: &str) -> Result<(), ValidationError> {
    if mongodb::bson::oid::ObjectId::parse_str(value).is_err() {
        return Err(ValidationError::new("object_id"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_blank() {
        assert!(not_blank("x").is_ok());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("").is_err());
    }

    #[test]
    fn test_object_id() {
        assert!(object_id("507f1f77bcf86cd799439011").is_ok());
        assert!(object_id("507f1f77").is_err());
    }
}
