use itertools::Itertools;

/// Helper trait which can be used to display symbols, words, outputs and
/// similar objects in a human readable way. This is mainly used for debugging
/// and tracing purposes.
pub trait Show {
    /// Returns a human readable representation of `self`. For a symbol this
    /// should just be the symbol itself, for an acceptance value something
    /// like `+` or `-`. Just use something that makes sense.
    fn show(&self) -> String;

    /// Show a collection of the thing, for a collection of characters this
    /// should be the induced string, wrapped in quotation marks.
    fn show_collection<'a, I>(_iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        unimplemented!("This operation makes no sense.")
    }
}

impl Show for char {
    fn show(&self) -> String {
        self.to_string()
    }

    fn show_collection<'a, I: IntoIterator<Item = &'a Self>>(iter: I) -> String
    where
        Self: 'a,
    {
        format!(
            "\"{}\"",
            iter.into_iter().map(|sym| sym.to_string()).join("")
        )
    }
}

impl Show for bool {
    fn show(&self) -> String {
        if *self { "+" } else { "-" }.to_string()
    }

    fn show_collection<'a, I: IntoIterator<Item = &'a Self>>(iter: I) -> String
    where
        Self: 'a,
    {
        format!("[{}]", iter.into_iter().map(|b| b.show()).join(""))
    }
}

impl Show for usize {
    fn show(&self) -> String {
        self.to_string()
    }

    fn show_collection<'a, I: IntoIterator<Item = &'a Self>>(iter: I) -> String
    where
        Self: 'a,
    {
        format!("{{{}}}", iter.into_iter().map(|x| x.show()).join(", "))
    }
}

impl Show for u32 {
    fn show(&self) -> String {
        self.to_string()
    }
}

impl<S: Show> Show for Option<S> {
    fn show(&self) -> String {
        match self {
            None => "".to_string(),
            Some(x) => x.show(),
        }
    }
}
