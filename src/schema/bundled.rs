//! Schema documents compiled into the binary, one table per protocol version

const OPARL_1_0: &[(&str, &str)] = &[
    ("agendaitem", include_str!("../../schema/1.0/AgendaItem.json")),
    ("body", include_str!("../../schema/1.0/Body.json")),
    ("consultation", include_str!("../../schema/1.0/Consultation.json")),
    ("file", include_str!("../../schema/1.0/File.json")),
    ("legislativeterm", include_str!("../../schema/1.0/LegislativeTerm.json")),
    ("location", include_str!("../../schema/1.0/Location.json")),
    ("meeting", include_str!("../../schema/1.0/Meeting.json")),
    ("membership", include_str!("../../schema/1.0/Membership.json")),
    ("organization", include_str!("../../schema/1.0/Organization.json")),
    ("paper", include_str!("../../schema/1.0/Paper.json")),
    ("person", include_str!("../../schema/1.0/Person.json")),
    ("system", include_str!("../../schema/1.0/System.json")),
];

/// Returns the (canonical type id, schema text) table for a protocol version
pub fn schemas_for(version: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match version {
        "1.0" => Some(OPARL_1_0),
        _ => None,
    }
}
