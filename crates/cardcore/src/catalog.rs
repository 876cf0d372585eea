//! Fixed catalog of quick commands used to pre-fill a command field.
//! No execution logic of its own.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickCommand {
    pub name: &'static str,
    pub description: &'static str,
    pub template: &'static str,
    pub category: &'static str,
}

pub const QUICK_COMMANDS: &[QuickCommand] = &[
    QuickCommand {
        name: "SELECT MF",
        description: "Select the master file (3F00)",
        template: "00A40000023F00",
        category: "file",
    },
    QuickCommand {
        name: "SELECT AID",
        description: "Select an application by identifier (append AID)",
        template: "00A40400",
        category: "file",
    },
    QuickCommand {
        name: "GET CHALLENGE",
        description: "Request an 8-byte random challenge",
        template: "0084000008",
        category: "security",
    },
    QuickCommand {
        name: "EXTERNAL AUTHENTICATE",
        description: "Authenticate the terminal (append cryptogram)",
        template: "00820000",
        category: "security",
    },
    QuickCommand {
        name: "VERIFY PIN",
        description: "Verify the cardholder PIN (append PIN block)",
        template: "00200001",
        category: "security",
    },
    QuickCommand {
        name: "READ BINARY",
        description: "Read from the selected transparent file",
        template: "00B0000000",
        category: "read",
    },
    QuickCommand {
        name: "READ RECORD",
        description: "Read record 1 of the selected file",
        template: "00B2010400",
        category: "read",
    },
    QuickCommand {
        name: "GET RESPONSE",
        description: "Fetch data left pending by the card",
        template: "00C0000000",
        category: "read",
    },
    QuickCommand {
        name: "GET UID",
        description: "Contactless pseudo-APDU returning the card UID",
        template: "FFCA000000",
        category: "card",
    },
    QuickCommand {
        name: "GET ATS",
        description: "Contactless pseudo-APDU returning the ATS",
        template: "FFCA010000",
        category: "card",
    },
];

/// Look up a quick command by its display name.
pub fn find(name: &str) -> Option<&'static QuickCommand> {
    QUICK_COMMANDS.iter().find(|c| c.name == name)
}

/// All entries in the given category, in catalog order.
pub fn by_category(category: &str) -> impl Iterator<Item = &'static QuickCommand> + use<'_> {
    QUICK_COMMANDS.iter().filter(move |c| c.category == category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_name() {
        assert_eq!(find("GET CHALLENGE").unwrap().template, "0084000008");
        assert!(find("NO SUCH COMMAND").is_none());
    }

    #[test]
    fn categories_partition_the_catalog() {
        let counted: usize = ["file", "security", "read", "card"]
            .iter()
            .map(|c| by_category(c).count())
            .sum();
        assert_eq!(counted, QUICK_COMMANDS.len());
    }
}
