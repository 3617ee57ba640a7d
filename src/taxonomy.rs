use crate::models::NewCategory;

/// (id, name, parent, description), parents listed before their children.
const SEED: &[(i64, &str, Option<i64>, &str)] = &[
    (1, "Lower Assembly", None, "Core lower receiver components"),
    (2, "Upper Assembly", None, "Core upper receiver components"),
    (17, "Miscellaneous Accessories", None, "Optional accessories"),
    (18, "Magazines and Feeding Devices", None, "Magazine options"),
    (19, "Rails and Mounting Accessories", None, "Mounting systems"),
    (3, "Grip", Some(1), "Pistol grip components"),
    (4, "Bolt Catch", Some(1), "Bolt catch mechanism"),
    (5, "Buffer System", Some(1), "Buffer and recoil components"),
    (6, "Lower Receiver", Some(1), "Lower receiver structure"),
    (7, "Magazine Release", Some(1), "Magazine release mechanism"),
    (8, "Trigger Assembly", Some(1), "Trigger and fire control components"),
    (9, "Fire Control Group", Some(1), "Safety and selector components"),
    (10, "Barrel", Some(2), "Barrel and gas system components"),
    (11, "Gas System", Some(2), "Gas operation components"),
    (12, "Upper Receiver", Some(2), "Upper receiver structure"),
    (13, "Bolt Carrier Group", Some(2), "Bolt and carrier components"),
    (14, "Handguard/Foregrip", Some(2), "Handguard and rail components"),
    (15, "Grip Screw", Some(3), "Screw for securing grip"),
    (16, "Bolt", Some(13), "Bolt component of BCG"),
    (20, "Slings", Some(17), "Sling attachments"),
    (21, "Rail Systems", Some(19), "Rail mounting options"),
    (22, "Two-Point Sling", Some(20), "Two-point sling option"),
];

pub fn seed_categories() -> Vec<NewCategory> {
    SEED.iter()
        .map(|(id, name, parent, description)| NewCategory {
            id: Some(*id),
            name: (*name).to_string(),
            parent_category_id: *parent,
            description: (*description).to_string(),
        })
        .collect()
}
