// ── Entity pattern rules ────────────────────────────────────────────────────
//
// Each rule is a regex whose first capture group is the entity name, the
// entity type it implies, and a base confidence. Templates use two
// placeholders expanded before compilation:
//   NAME  - one capitalised word (hyphenated parts allowed)
//   NAME2 - one or two capitalised words

use regex::Regex;

use crate::atoms::error::{LoreError, LoreResult};
use crate::atoms::types::EntityType;

const NAME: &str = r"[A-Z][a-z]+(?:-[A-Z][a-z]+)?";
const NAME2: &str = r"[A-Z][a-z]+(?:-[A-Z][a-z]+)?(?:\s+[A-Z][a-z]+(?:-[A-Z][a-z]+)?)?";

/// A compiled extraction rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub id: &'static str,
    pub entity_type: EntityType,
    pub base_confidence: f32,
    pub regex: Regex,
    /// Skip matches directly followed by `'s` (the noun belongs to someone).
    pub reject_possessive: bool,
}

struct RuleSpec {
    id: &'static str,
    entity_type: EntityType,
    base_confidence: f32,
    template: &'static str,
    reject_possessive: bool,
}

const RULES: &[RuleSpec] = &[
    // ── Characters ──────────────────────────────────────────────────────
    RuleSpec {
        id: "title",
        entity_type: EntityType::Character,
        base_confidence: 0.55,
        template: r"\b(?:Lord|Lady|Sir|Dame|King|Queen|Prince|Princess|Duke|Duchess|Captain|Commander|General|Master|Mistress|Doctor|Professor|Father|Mother|Elder)\s+(NAME2)",
        reject_possessive: false,
    },
    RuleSpec {
        id: "speech",
        entity_type: EntityType::Character,
        base_confidence: 0.5,
        template: r"\b(NAME2)\s+(?:said|says|asked|asks|replied|replies|whispered|whispers|shouted|shouts|murmured|murmurs|muttered|mutters|laughed|laughs|smiled|smiles|nodded|nods|sighed|sighs|grinned|grins)\b",
        reject_possessive: false,
    },
    RuleSpec {
        id: "introduction",
        entity_type: EntityType::Character,
        base_confidence: 0.5,
        template: r"\b(?:named|called|known as|name is)\s+(NAME2)",
        reject_possessive: true,
    },
    RuleSpec {
        id: "possessive",
        entity_type: EntityType::Character,
        base_confidence: 0.45,
        template: r"\b(NAME)'s\s+(?:eyes|gaze|hand|hands|voice|face|hair|lips|smile|expression|shoulder|shoulders|arm|arms|heart)\b",
        reject_possessive: false,
    },
    // ── Locations ───────────────────────────────────────────────────────
    RuleSpec {
        id: "place_suffix",
        entity_type: EntityType::Location,
        base_confidence: 0.6,
        template: r"\b((?:NAME\s+){1,3}(?:City|Town|Village|Kingdom|Forest|Woods|Mountains?|Peaks?|River|Lake|Castle|Tower|Temple|Inn|Tavern|Keep|Valley|Desert|Sea|Isle|Island|Harbor|Harbour|Port|Citadel|Fortress|Plains|Marsh|Swamp|Caverns?|Ruins))\b",
        reject_possessive: false,
    },
    RuleSpec {
        id: "region_of",
        entity_type: EntityType::Location,
        base_confidence: 0.6,
        template: r"\b(?:city|town|village|kingdom|realm|empire|land|lands|province|region|capital|duchy|republic)\s+of\s+(NAME2)",
        reject_possessive: true,
    },
    RuleSpec {
        id: "movement",
        entity_type: EntityType::Location,
        base_confidence: 0.45,
        template: r"\b(?:travell?ed|travels|journeyed|arrived|arrives|returned|returns|went|headed|heads|sailed|sails|rode|fled)\s+(?:to|into|toward|towards|from|at|in)\s+(?:the\s+)?(NAME2)",
        reject_possessive: true,
    },
    // ── Items ───────────────────────────────────────────────────────────
    RuleSpec {
        id: "item_suffix",
        entity_type: EntityType::Item,
        base_confidence: 0.55,
        template: r"\b((?:NAME\s+){1,2}(?:Sword|Blade|Amulet|Ring|Staff|Crown|Shield|Orb|Tome|Grimoire|Scroll|Dagger|Bow|Axe|Hammer|Gem|Stone|Crystal|Chalice|Key|Cloak|Pendant|Spear|Lance|Relic))\b",
        reject_possessive: false,
    },
    RuleSpec {
        id: "item_of",
        entity_type: EntityType::Item,
        base_confidence: 0.55,
        template: r"\b((?:Sword|Blade|Amulet|Ring|Staff|Crown|Shield|Orb|Tome|Dagger|Bow|Axe|Hammer|Chalice|Key|Cloak|Pendant|Spear)\s+of\s+(?:the\s+)?NAME2)",
        reject_possessive: false,
    },
    RuleSpec {
        id: "wield",
        entity_type: EntityType::Item,
        base_confidence: 0.45,
        template: r"\b(?:wielded|wields|wielding|carried|carries|carrying|held|holds|holding|drew|draws|brandished|brandishes|clutched|clutches)\s+(?:the\s+|a\s+|an\s+|his\s+|her\s+|their\s+)?(NAME2)",
        reject_possessive: true,
    },
    // ── Organizations ───────────────────────────────────────────────────
    RuleSpec {
        id: "org_suffix",
        entity_type: EntityType::Organization,
        base_confidence: 0.6,
        template: r"\b((?:NAME\s+){1,3}(?:Guild|Order|Brotherhood|Sisterhood|Council|Clan|Company|Legion|Church|Circle|Alliance|Syndicate|Cult|Academy|Guard|Watch|Court|Covenant|Consortium))\b",
        reject_possessive: false,
    },
    RuleSpec {
        id: "org_of",
        entity_type: EntityType::Organization,
        base_confidence: 0.6,
        template: r"\b((?:Order|Guild|Brotherhood|Sisterhood|Council|Circle|Church|Knights|House|Keepers)\s+of\s+(?:the\s+)?NAME2)",
        reject_possessive: false,
    },
    RuleSpec {
        id: "member_of",
        entity_type: EntityType::Organization,
        base_confidence: 0.5,
        template: r"\b(?:member|members|leader|leaders|agent|agents|knight|knights|soldier|soldiers|envoy|emissary)\s+of\s+the\s+(NAME2)",
        reject_possessive: true,
    },
];

fn expand(template: &str) -> String {
    template.replace("NAME2", NAME2).replace("NAME", NAME)
}

/// Compile every rule whose entity type is enabled.
pub fn build_rules(enabled: &[EntityType]) -> LoreResult<Vec<PatternRule>> {
    RULES
        .iter()
        .filter(|spec| enabled.contains(&spec.entity_type))
        .map(|spec| {
            let regex = Regex::new(&expand(spec.template)).map_err(|e| {
                LoreError::config(format!("entity pattern '{}' failed to compile: {e}", spec.id))
            })?;
            Ok(PatternRule {
                id: spec.id,
                entity_type: spec.entity_type,
                base_confidence: spec.base_confidence,
                regex,
                reject_possessive: spec.reject_possessive,
            })
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Word lists
// ═══════════════════════════════════════════════════════════════════════════

/// Capitalised words that are never names on their own: sentence starters,
/// pronouns, interjections, calendar words.
pub(crate) const COMMON_WORDS: &[&str] = &[
    "the", "a", "an", "and", "but", "or", "so", "then", "when", "while", "after",
    "before", "as", "if", "though", "although", "because", "once", "still", "yet",
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
    "my", "your", "his", "its", "our", "their", "this", "that", "these", "those",
    "there", "here", "what", "which", "who", "whom", "why", "how", "where",
    "yes", "no", "oh", "ah", "well", "okay", "ok", "hey", "hello", "hi", "please",
    "thanks", "sorry", "maybe", "perhaps", "just", "even", "now", "later", "today",
    "tomorrow", "yesterday", "everyone", "someone", "something", "nothing",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december", "god", "gods", "sir", "lady",
    "lord", "master", "mistress", "captain", "king", "queen",
];

/// Leading words stripped from a matched name ("The Silver Order" → "Silver Order").
pub(crate) const LEADING_NOISE: &[&str] = &[
    "the", "a", "an", "then", "and", "but", "so", "when", "while", "as", "once",
];

/// Words whose presence in the same message supports a given entity type.
pub(crate) fn type_keywords(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Character => &[
            "said", "asked", "smiled", "eyes", "voice", "friend", "companion", "she", "he",
            "her", "his",
        ],
        EntityType::Location => &[
            "road", "gates", "walls", "north", "south", "east", "west", "travel", "journey",
            "arrived", "streets", "city", "map",
        ],
        EntityType::Item => &[
            "magic", "enchanted", "forged", "ancient", "wield", "blade", "glowing", "power",
            "artifact", "weapon", "cursed",
        ],
        EntityType::Organization => &[
            "member", "members", "guild", "order", "leader", "sworn", "join", "joined",
            "allies", "council", "ranks",
        ],
    }
}
