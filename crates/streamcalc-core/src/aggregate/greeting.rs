use super::{Aggregator, Reducer};

/// Formats the greeting for one name.
pub fn greeting_for(first_name: &str) -> String {
    format!("Hello {first_name}!")
}

/// Greets every input as it arrives: each name emits exactly one greeting.
#[derive(Clone, Copy, Debug, Default)]
pub struct Greeting;

impl Aggregator for Greeting {
    type Input = String;
    type Emit = String;

    fn update(&mut self, first_name: String) -> Option<String> {
        Some(greeting_for(&first_name))
    }
}

/// Concatenates one greeting per input into a single message.
///
/// Unlike an average, an empty greeting is a valid result.
#[derive(Clone, Debug, Default)]
pub struct GreetingConcat {
    result: String,
}

impl GreetingConcat {
    pub const fn new() -> Self {
        Self {
            result: String::new(),
        }
    }
}

impl Reducer for GreetingConcat {
    type Input = String;
    type Output = String;

    fn fold(&mut self, first_name: String) {
        self.result.push_str(&greeting_for(&first_name));
        self.result.push(' ');
    }

    fn finish(self) -> crate::Result<String> {
        Ok(self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greets_each_name() {
        let mut greeting = Greeting;
        assert_eq!(
            greeting.update("Nora".to_string()),
            Some("Hello Nora!".to_string())
        );
    }

    #[test]
    fn concatenates_in_order() {
        let mut concat = GreetingConcat::new();
        for name in ["Adam", "Sven", "Albert"] {
            concat.fold(name.to_string());
        }
        assert_eq!(
            concat.finish(),
            Ok("Hello Adam! Hello Sven! Hello Albert! ".to_string())
        );
        assert_eq!(GreetingConcat::new().finish(), Ok(String::new()));
    }
}
