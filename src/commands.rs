use crate::remote::Table;

/// Entity names accepted by `list` and their lookup logic
#[derive(Debug, Clone)]
pub struct EntityName {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub table: Table,
}

/// All listable entities
pub const ENTITIES: &[EntityName] = &[
  EntityName {
    name: "classes",
    aliases: &["c", "class", "sections"],
    description: "Classes with their subject",
    table: Table::Classes,
  },
  EntityName {
    name: "students",
    aliases: &["s", "student", "pupils"],
    description: "Enrolled students",
    table: Table::Students,
  },
  EntityName {
    name: "assignments",
    aliases: &["a", "assignment", "homework"],
    description: "Assignments, optionally for one class",
    table: Table::Assignments,
  },
  EntityName {
    name: "grades",
    aliases: &["g", "grade", "marks"],
    description: "Grades, optionally for one assignment",
    table: Table::Grades,
  },
  EntityName {
    name: "attendance",
    aliases: &["att", "roll", "register"],
    description: "Attendance, optionally by class and date",
    table: Table::Attendance,
  },
  EntityName {
    name: "subjects",
    aliases: &["subj", "subject", "courses"],
    description: "Subjects",
    table: Table::Subjects,
  },
];

/// Candidate entities for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static EntityName> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return ENTITIES.iter().collect();
  }

  let mut matches: Vec<(&EntityName, u32)> = Vec::new();

  for entity in ENTITIES {
    // Exact match on name
    if entity.name == input_lower {
      matches.push((entity, 0));
      continue;
    }

    // Exact match on alias
    if entity.aliases.contains(&input_lower.as_str()) {
      matches.push((entity, 1));
      continue;
    }

    // Prefix match on name
    if entity.name.starts_with(&input_lower) {
      matches.push((entity, 2));
      continue;
    }

    // Prefix match on alias
    if entity.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((entity, 3));
      continue;
    }

    // Fuzzy match (contains)
    if entity.name.contains(&input_lower) {
      matches.push((entity, 4));
      continue;
    }

    if entity.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((entity, 5));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(entity, _)| entity).collect()
}

/// One line per entity: name, aliases and description
pub fn entity_table() -> String {
  ENTITIES
    .iter()
    .map(|e| format!("  {:<12} {:<28} {}", e.name, e.aliases.join(", "), e.description))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Best-matching entity, if any
pub fn resolve(input: &str) -> Option<&'static EntityName> {
  get_suggestions(input.trim()).into_iter().next()
}
