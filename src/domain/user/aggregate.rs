//! User aggregate - the points balance owned by the users service.
//!
//! A user is created by onboarding and is only ever mutated through the
//! aggregate transaction, which reconstructs it from a flat row with
//! [`User::unmarshal`], applies one mutation, and writes the flat fields back.

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Points balance for one user.
///
/// # Invariants
///
/// - `points` is never negative.
/// - `points` only decreases through [`User::use_points`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    email: String,
    points: i64,
}

impl User {
    /// Reconstructs a user from its stored columns.
    ///
    /// No business rules run here; the row is trusted because it was written
    /// through this type.
    pub fn unmarshal(id: UserId, email: impl Into<String>, points: i64) -> Self {
        Self {
            id,
            email: email.into(),
            points,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn points(&self) -> i64 {
        self.points
    }

    /// Spends `points` from the balance.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `points` is zero or negative
    /// - `InsufficientPoints` if the balance is lower than `points`
    ///
    /// On error the balance is unchanged.
    pub fn use_points(&mut self, points: i64) -> Result<(), DomainError> {
        if points <= 0 {
            return Err(DomainError::new(
                ErrorCode::InvalidQuantity,
                "points must be greater than 0",
            )
            .with_detail("points", points.to_string()));
        }

        if self.points < points {
            return Err(
                DomainError::new(ErrorCode::InsufficientPoints, "not enough points")
                    .with_detail("requested", points.to_string())
                    .with_detail("available", self.points.to_string()),
            );
        }

        self.points -= points;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(points: i64) -> User {
        User::unmarshal(UserId::from_raw(1), "user@example.com", points)
    }

    #[test]
    fn unmarshal_restores_all_fields() {
        let user = User::unmarshal(UserId::from_raw(5), "five@example.com", 40);

        assert_eq!(user.id().as_i64(), 5);
        assert_eq!(user.email(), "five@example.com");
        assert_eq!(user.points(), 40);
    }

    #[test]
    fn use_points_deducts_from_balance() {
        let mut user = user_with(100);

        user.use_points(25).unwrap();

        assert_eq!(user.points(), 75);
    }

    #[test]
    fn use_points_can_spend_entire_balance() {
        let mut user = user_with(30);

        user.use_points(30).unwrap();

        assert_eq!(user.points(), 0);
    }

    #[test]
    fn use_points_rejects_more_than_balance() {
        let mut user = user_with(100);

        let err = user.use_points(200).unwrap_err();

        assert_eq!(err.code, ErrorCode::InsufficientPoints);
        assert_eq!(err.details.get("available"), Some(&"100".to_string()));
        assert_eq!(user.points(), 100);
    }

    #[test]
    fn use_points_rejects_non_positive_quantity() {
        let mut user = user_with(100);

        assert_eq!(user.use_points(0).unwrap_err().code, ErrorCode::InvalidQuantity);
        assert_eq!(user.use_points(-5).unwrap_err().code, ErrorCode::InvalidQuantity);
        assert_eq!(user.points(), 100);
    }
}
