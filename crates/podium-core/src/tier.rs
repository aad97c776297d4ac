/// Named competitive bracket derived from a numeric rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingTier {
    /// Lowest rating that belongs to this tier.
    pub min_rating: u32,
    pub name: &'static str,
    pub color: &'static str,
}

/// Tier table in descending threshold order, catch-all last.
///
/// Boundary ratings belong to the tier whose threshold they equal.
pub const RATING_TIERS: [RatingTier; 8] = [
    RatingTier {
        min_rating: 2400,
        name: "Grandmaster",
        color: "#FF0000",
    },
    RatingTier {
        min_rating: 2200,
        name: "International Master",
        color: "#FFA500",
    },
    RatingTier {
        min_rating: 2000,
        name: "Master",
        color: "#FFD700",
    },
    RatingTier {
        min_rating: 1800,
        name: "Expert",
        color: "#800080",
    },
    RatingTier {
        min_rating: 1600,
        name: "Advanced",
        color: "#0000FF",
    },
    RatingTier {
        min_rating: 1400,
        name: "Intermediate",
        color: "#008000",
    },
    RatingTier {
        min_rating: 1200,
        name: "Beginner",
        color: "#808080",
    },
    RatingTier {
        min_rating: 0,
        name: "Newbie",
        color: "#808080",
    },
];

/// Map a rating to its tier.
///
/// Total over every input: values below the lowest threshold, negatives and
/// NaN all land in the catch-all tier.
pub fn classify(rating: f64) -> &'static RatingTier {
    for tier in &RATING_TIERS[..RATING_TIERS.len() - 1] {
        if rating >= f64::from(tier.min_rating) {
            return tier;
        }
    }
    &RATING_TIERS[RATING_TIERS.len() - 1]
}
