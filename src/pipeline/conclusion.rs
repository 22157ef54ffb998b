//! Human-readable conclusions for persisted facts
//!
//! Known fact types map to a fixed sentence template. Anything else falls
//! into `FactKind::Other` and renders as "<Type> of <user> is <value>".

/// Fact types with a dedicated conclusion template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactKind {
    Phone,
    Email,
    Address,
    DateOfBirth,
    Name,
    Age,
    Occupation,
    Company,
    RelationshipStatus,
    Gender,
    Nationality,
    DocumentType,
    AadhaarNumber,
    PanNumber,
    FamilyMember,
    Friend,
    Colleague,
    ContactName,
    RelationshipType,
    FoodPreference,
    RestaurantPreference,
    Allergy,
    ServiceProvider,
    VendorName,
    Habit,
    Routine,
    Other(String),
}

impl FactKind {
    /// Classify a raw fact type
    pub fn parse(fact_type: &str) -> Self {
        match fact_type.trim().to_lowercase().as_str() {
            "phone" | "phone_number" => Self::Phone,
            "email" => Self::Email,
            "address" => Self::Address,
            "dob" | "date_of_birth" => Self::DateOfBirth,
            "name" => Self::Name,
            "age" => Self::Age,
            "occupation" => Self::Occupation,
            "company" => Self::Company,
            "relationship_status" => Self::RelationshipStatus,
            "gender" => Self::Gender,
            "nationality" => Self::Nationality,
            "document_type" => Self::DocumentType,
            "aadhaar_number" => Self::AadhaarNumber,
            "pan_number" => Self::PanNumber,
            "family_member" => Self::FamilyMember,
            "friend" => Self::Friend,
            "colleague" => Self::Colleague,
            "contact_name" => Self::ContactName,
            "relationship_type" => Self::RelationshipType,
            "food_preference" => Self::FoodPreference,
            "restaurant_preference" => Self::RestaurantPreference,
            "allergy" => Self::Allergy,
            "service_provider" => Self::ServiceProvider,
            "vendor_name" => Self::VendorName,
            "habit" => Self::Habit,
            "routine" => Self::Routine,
            _ => Self::Other(fact_type.trim().to_string()),
        }
    }

    /// Render the conclusion sentence
    pub fn render(&self, user: &str, value: &str) -> String {
        match self {
            Self::Phone => format!("Phone number of {user} is {value}"),
            Self::Email => format!("Email of {user} is {value}"),
            Self::Address => format!("Home address of {user} is {value}"),
            Self::DateOfBirth => format!("Date of birth of {user} is {value}"),
            Self::Name => format!("Name of {user} is {value}"),
            Self::Age => format!("Age of {user} is {value}"),
            Self::Occupation => format!("Occupation of {user} is {value}"),
            Self::Company => format!("{user} works at {value}"),
            Self::RelationshipStatus => format!("Relationship status of {user} is {value}"),
            Self::Gender => format!("Gender of {user} is {value}"),
            Self::Nationality => format!("Nationality of {user} is {value}"),
            Self::DocumentType => format!("{user} has shared a {value} document"),
            Self::AadhaarNumber => format!("Aadhaar number of {user} is {value}"),
            Self::PanNumber => format!("PAN number of {user} is {value}"),
            Self::FamilyMember => format!("{value} is a family member of {user}"),
            Self::Friend => format!("{value} is a friend of {user}"),
            Self::Colleague => format!("{value} is a colleague of {user}"),
            Self::ContactName => format!("{user} has a contact named {value}"),
            Self::RelationshipType => format!("{user} has a {value} relationship"),
            Self::FoodPreference => format!("{user} prefers {value} food"),
            Self::RestaurantPreference => format!("{user} likes {value} restaurant"),
            Self::Allergy => format!("{user} is allergic to {value}"),
            Self::ServiceProvider => format!("{user} uses {value} as a service provider"),
            Self::VendorName => format!("{user} uses {value} as a vendor"),
            Self::Habit => format!("{user} has a habit of {value}"),
            Self::Routine => format!("{user} has a routine of {value}"),
            Self::Other(fact_type) => {
                format!("{} of {user} is {value}", title_case(fact_type))
            }
        }
    }
}

/// Conclusion for a raw fact type
pub fn conclusion(fact_type: &str, user: &str, value: &str) -> String {
    FactKind::parse(fact_type).render(user, value)
}

/// `blood_group` -> `Blood Group`
fn title_case(fact_type: &str) -> String {
    fact_type
        .split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
